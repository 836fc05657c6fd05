pub mod check;
pub mod compile_unit_info;
pub mod driver;
pub mod foreign;
pub mod ir;
pub mod nfi;
pub mod platform;
pub mod profdiff;
