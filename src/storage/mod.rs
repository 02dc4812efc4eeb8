// Persistence seams — durable key-value storage and the on-device file store.

pub mod fs_store;
pub mod kv;
pub mod traits;
