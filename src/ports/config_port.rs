//! Configuration access port trait.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    /// `default` when the key is absent or not a recognised boolean.
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
    /// Section names, sorted.
    fn sections(&self) -> Vec<String>;
    /// Key names within `section`, sorted.
    fn keys(&self, section: &str) -> Vec<String>;
}
