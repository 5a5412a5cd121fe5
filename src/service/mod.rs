//! 服务层
//!
//! 属性集、过滤器、服务引用和服务注册表。

pub mod filter;
pub mod properties;
pub mod reference;
pub mod registry;

pub use filter::{CompareOp, Filter, FilterNode};
pub use properties::{Properties, PropertyValue, OBJECT_CLASS, SERVICE_ID, SERVICE_RANKING};
pub use reference::{
    ServiceFactory, ServiceObject, ServiceReference, ServiceRegistration, ServiceSource,
};
pub use registry::ServiceRegistry;
