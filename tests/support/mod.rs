#![allow(dead_code)]

pub mod proxy;
pub mod server;
pub mod tls;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
