//! sea-orm entities backing the catalog, the sale/return records and the stock ledger.

pub mod product;
pub mod product_return;
pub mod sale;
pub mod stock_movement;
pub mod user;

pub use product::{fits_money_column, Entity as Product, Model as ProductModel, MAX_MONEY};
pub use product_return::{Entity as ProductReturn, Model as ProductReturnModel};
pub use sale::{DeliveryType, Entity as Sale, Model as SaleModel, PaymentMethod};
pub use stock_movement::{Entity as StockMovement, Model as StockMovementModel, MovementType};
pub use user::{Entity as User, Model as UserModel, UserRole};
