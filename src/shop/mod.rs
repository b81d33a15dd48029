//! SportsHub store back-end.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │  (SPA)   │ <─────── │    └─ api/  (route handlers, AppState, ApiError) │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         │ DbHandle::call()                       │
//!                       │         v                                        │
//!                       │  db/  (ShopDb: users, products, stock, cart,     │
//!                       │        orders, reviews, help tickets)            │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! | Module   | Responsibility                                              |
//! |----------|-------------------------------------------------------------|
//! | `api`    | REST handlers, maps `ShopError` to HTTP status codes        |
//! | `db`     | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)         |
//! | `auth`   | Salted password hashing, email normalization                |
//! | `ws`     | `WsMessage` store events + `broadcast_message()` helper     |
//! | `server` | Router assembly, CORS, request tracing, graceful shutdown   |
//!
//! ## Checkout (`POST /api/users/{user_id}/orders`)
//!
//! 1. Handler reads the optional `Idempotency-Key` header.
//! 2. `ShopDb::place_order` returns the earlier order if the key was seen.
//! 3. Otherwise, in one transaction: every cart line's stock row is checked
//!    and decremented, order items are written at the current price, the
//!    cart is emptied. Any shortfall rolls the whole thing back.
//! 4. Stock changes and the new order are broadcast over `/ws`.

pub mod api;
pub mod auth;
pub mod db;
pub mod server;
pub mod ws;
