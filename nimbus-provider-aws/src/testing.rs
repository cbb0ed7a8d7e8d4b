//! Helpers shared by handler tests

use nimbus_core::resource::ResourceId;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn id(resource_type: &str, name: &str) -> ResourceId {
    ResourceId::new(resource_type, name)
}
