#![allow(dead_code)]

pub mod mocks;
pub mod socket_guard;
