#[cfg(not(feature = "loom"))]
mod unit_tests;
