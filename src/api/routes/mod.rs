use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::AppState;

pub fn create_router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        // Users & points
        .route("/users", post(handlers::user::signup))
        .route("/users/:user_id/points", get(handlers::user::get_points))
        .route(
            "/users/:user_id/points/charge",
            post(handlers::user::charge_points),
        )
        // Products
        .route("/products", get(handlers::product::list_products))
        .route("/products/:product_id", get(handlers::product::get_product))
        .route("/products/:product_id/likes", put(handlers::like::add_like))
        .route(
            "/products/:product_id/likes",
            delete(handlers::like::remove_like),
        )
        // Orders
        .route("/orders", post(handlers::order::create_order))
        .route("/orders/:order_id", get(handlers::order::get_order))
        .route(
            "/orders/:order_id/cancel",
            post(handlers::order::cancel_order),
        )
        .route(
            "/orders/:order_id/payment",
            get(handlers::payment::get_payment),
        )
        // Coupons
        .route("/coupons", post(handlers::coupon::issue_coupon))
        .route("/coupons/:code/apply", post(handlers::coupon::apply_coupon))
        // Payment gateway callback
        .route("/payments/callback", post(handlers::payment::pg_callback))
        // Rankings
        .route("/rankings/today", get(handlers::ranking::today_ranking))
        .route("/rankings", get(handlers::ranking::period_ranking))
        .route(
            "/internal/rankings/run",
            post(handlers::ranking::run_ranking),
        )
}
