//! Shared domain types for SportsHub.
//!
//! These are the records the store persists and the view types the HTTP layer
//! returns. They carry no I/O; persistence lives in the `sportshub` crate.

pub mod catalog;
pub mod orders;
pub mod support;
pub mod users;

pub use catalog::{Product, ProductDetail, Review, Stock};
pub use orders::{CartItem, CartLine, CartView, Order, OrderDetail, OrderItem, OrderStatus};
pub use support::{HelpTicket, TicketDetail, TicketResponse, TicketStatus};
pub use users::{Preferences, Role, User};
