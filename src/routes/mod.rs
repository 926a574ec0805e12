//! HTTP surface.
//!
//! Storefront routes live at the paths the maintenance gate classifies:
//! `/shop`, `/product/:id`, `/cart/...`, `/checkout`, `/orders` and the
//! payment landing pages form the conditionally blocked surface, while
//! `/`, `/auth`, `/admin` and the diagnostics stay reachable during a
//! window. The webhook is deliberately unlisted so providers can still
//! report payment outcomes mid-maintenance.

pub mod admin;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod payment;
pub mod shop;
pub mod system;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(system::index))
        .route("/health", get(system::health))
        .route("/ready", get(system::ready))
        .route("/auth", get(system::auth_session))
        .route("/account", get(system::account))
        .route("/shop", get(shop::list_products))
        .route("/shop/categories", get(shop::list_categories))
        .route("/shop/categories/:id", get(shop::get_category))
        .route("/product/:id", get(shop::get_product))
        .route("/cart/:session", get(cart::get_cart).post(cart::add_to_cart).delete(cart::clear_cart))
        .route("/cart/:session/items/:product_id", put(cart::update_item).delete(cart::remove_item))
        .route("/checkout", post(checkout::checkout))
        .route("/orders", get(orders::list_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/payment-success", get(payment::payment_success))
        .route("/finish-payment", get(payment::finish_payment))
        .route("/payment-error", get(payment::payment_error))
        .route("/payments/webhook", post(payment::webhook))
        .route("/admin", get(admin::overview))
        .route("/admin/products", post(admin::create_product))
        .route("/admin/products/:id", put(admin::update_product).delete(admin::archive_product))
        .route("/admin/categories", post(admin::create_category))
        .route("/admin/maintenance", get(admin::get_maintenance).put(admin::update_maintenance))
        .with_state(state)
}
