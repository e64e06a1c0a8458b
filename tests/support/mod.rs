#![allow(dead_code)]

pub mod architecture;
