//! 兼容服务集成测试

use std::sync::Arc;

use parking_lot::Mutex;

use chips_runtime::compat::{MODULE_ADMIN_INTERFACE, START_LEVEL_INTERFACE};
use chips_runtime::{
    ActivatorRegistry, Framework, FrameworkConfig, FrameworkEventKind, ModuleAdminService,
    ModuleDescriptor, StartLevelService,
};

fn framework() -> Framework {
    Framework::new(
        FrameworkConfig::builder()
            .synchronous_delivery()
            .synchronous_stop()
            .build(),
        Arc::new(ActivatorRegistry::new()),
    )
}

#[tokio::test]
async fn test_compat_services_registered_by_system() {
    let fw = framework();
    fw.install(ModuleDescriptor::new("mem:a").symbolic_name("com.example.a"))
        .unwrap();
    fw.start().await.unwrap();
    let context = fw.context().unwrap();

    let reference = context
        .get_service_reference(START_LEVEL_INTERFACE)
        .unwrap()
        .unwrap();
    assert_eq!(reference.module().unwrap().id(), 0);
    let start_level = context
        .get_service_as::<StartLevelService>(&reference)
        .unwrap()
        .unwrap();
    let module = fw.module(1).unwrap();
    assert_eq!(start_level.module_start_level(&module), 1);
    assert!(start_level.is_persistently_started(&module));

    let reference = context
        .get_service_reference(MODULE_ADMIN_INTERFACE)
        .unwrap()
        .unwrap();
    let admin = context
        .get_service_as::<ModuleAdminService>(&reference)
        .unwrap()
        .unwrap();
    let found = admin.modules_by_name("  com.example.a ");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), 1);
    assert!(admin.modules_by_name("com.example.missing").is_empty());
    assert!(admin.resolve(&found));
    assert_eq!(admin.module_type(&found[0]), 0);

    fw.stop().await.unwrap();
    assert!(fw
        .registry()
        .get_references(Some(START_LEVEL_INTERFACE), None)
        .is_empty());
}

#[tokio::test]
async fn test_refresh_fires_packages_refreshed() {
    let fw = framework();
    fw.start().await.unwrap();
    let context = fw.context().unwrap();

    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = kinds.clone();
    context
        .add_framework_listener(Arc::new(move |event| sink.lock().push(event.kind)))
        .unwrap();

    let reference = context
        .get_service_reference(MODULE_ADMIN_INTERFACE)
        .unwrap()
        .unwrap();
    let admin = context
        .get_service_as::<ModuleAdminService>(&reference)
        .unwrap()
        .unwrap();
    admin.refresh(&[]);

    assert_eq!(*kinds.lock(), vec![FrameworkEventKind::PackagesRefreshed]);
    fw.stop().await.unwrap();
}
