pub mod catalog;
pub mod payment_methods;
pub mod payments;
pub mod purchase;
pub mod sales;
pub mod users;
