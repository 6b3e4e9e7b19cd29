pub mod call;
pub mod customer;
pub mod deal;
pub mod employee;
pub mod product;
