pub mod auth;
pub mod health;
pub mod products;
pub mod reports;
pub mod sales;
pub mod stock;
