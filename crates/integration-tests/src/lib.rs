//! Integration tests for Shopfront.
//!
//! The client library is exercised end to end, through its real `reqwest`
//! transport, against [`FakeCommerceService`]: an in-process axum server
//! speaking the commerce service's JSON contract, bound to an ephemeral port.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopfront-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

use shopfront_core::{
    CartLine, CartLineId, CartSnapshot, Order, OrderId, OrderLine, OrderLineId, OrderStatus,
    PaymentStatus, Price, Product, ProductId, UserId,
};

/// Build a catalog product priced in cents.
///
/// # Panics
///
/// Panics if `cents` is negative.
#[must_use]
pub fn product(id: &str, name: &str, cents: i64, stock: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_string(),
        price: Price::from_cents(cents).expect("Price must not be negative"),
        image: format!("/images/{id}.jpg"),
        stock,
    }
}

/// Shape of `GET /cart` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CartShape {
    /// `{ "items": [...] }`
    #[default]
    Wrapped,
    /// `[...]`
    Bare,
}

#[derive(Debug, Clone)]
struct User {
    id: UserId,
    full_name: String,
    password: String,
}

#[derive(Default)]
struct ServiceState {
    products: Vec<Product>,
    users: HashMap<String, User>,
    /// token -> email
    sessions: HashMap<String, String>,
    /// email -> lines
    carts: HashMap<String, Vec<(CartLineId, ProductId, u32)>>,
    orders: HashMap<String, Vec<Order>>,
    request_ids: Vec<Option<String>>,
    cart_shape: CartShape,
    next_id: u64,
}

impl ServiceState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn snapshot(&self, email: &str) -> CartSnapshot {
        let lines = self
            .carts
            .get(email)
            .into_iter()
            .flatten()
            .filter_map(|(line_id, product_id, quantity)| {
                let product = self.products.iter().find(|p| &p.id == product_id)?;
                Some(CartLine {
                    id: line_id.clone(),
                    product: product.clone(),
                    quantity: *quantity,
                })
            })
            .collect();
        CartSnapshot::new(lines)
    }

    fn cart_body(&self, email: &str) -> Value {
        let snapshot = self.snapshot(email);
        match self.cart_shape {
            CartShape::Wrapped => json!({ "items": snapshot.lines() }),
            CartShape::Bare => json!(snapshot.lines()),
        }
    }

    fn product_mut(&mut self, product_id: &ProductId) -> Option<&mut Product> {
        self.products.iter_mut().find(|p| &p.id == product_id)
    }
}

type Shared = Arc<Mutex<ServiceState>>;

fn lock(state: &Shared) -> std::sync::MutexGuard<'_, ServiceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Error response with a `{ "message" }` body.
struct Failure(StatusCode, &'static str);

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "message": self.1 }))).into_response()
    }
}

/// Resolve the bearer token to the user's email.
fn authenticate(state: &ServiceState, headers: &HeaderMap) -> Result<String, Failure> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| state.sessions.get(token))
        .cloned()
        .ok_or(Failure(StatusCode::UNAUTHORIZED, "Invalid or missing token"))
}

/// In-process fake of the remote commerce service.
pub struct FakeCommerceService {
    base_url: Url,
    state: Shared,
    server: JoinHandle<()>,
}

impl FakeCommerceService {
    /// Start the service with a product listing.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start(products: Vec<Product>) -> Self {
        let state: Shared = Arc::new(Mutex::new(ServiceState {
            products,
            ..ServiceState::default()
        }));

        let api = Router::new()
            .route("/products", get(list_products))
            .route("/cart", get(fetch_cart).post(add_to_cart))
            .route("/cart/{product_id}", delete(remove_from_cart))
            .route("/orders", get(list_orders).post(create_order))
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                record_request_id,
            ))
            .with_state(Arc::clone(&state));
        let app = Router::new().nest("/api", api);

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Fake commerce service failed");
        });

        let base_url = Url::parse(&format!("http://{addr}/api")).expect("Invalid base URL");
        Self {
            base_url,
            state,
            server,
        }
    }

    /// Base URL to configure the client with.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create an account directly.
    pub fn add_user(&self, email: &str, password: &str, full_name: &str) {
        let mut state = lock(&self.state);
        let id = UserId::new(state.next_id("user-"));
        state.users.insert(
            email.to_string(),
            User {
                id,
                full_name: full_name.to_string(),
                password: password.to_string(),
            },
        );
    }

    /// Invalidate every issued token.
    pub fn expire_sessions(&self) {
        lock(&self.state).sessions.clear();
    }

    pub fn set_stock(&self, product_id: &str, stock: u32) {
        if let Some(product) = lock(&self.state).product_mut(&ProductId::new(product_id)) {
            product.stock = stock;
        }
    }

    #[must_use]
    pub fn stock(&self, product_id: &str) -> Option<u32> {
        lock(&self.state)
            .products
            .iter()
            .find(|p| p.id.as_str() == product_id)
            .map(|p| p.stock)
    }

    pub fn set_cart_shape(&self, shape: CartShape) {
        lock(&self.state).cart_shape = shape;
    }

    /// Server-side cart of a user.
    #[must_use]
    pub fn cart_of(&self, email: &str) -> CartSnapshot {
        lock(&self.state).snapshot(email)
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.state).request_ids.len()
    }

    /// `x-request-id` of every request received, in arrival order.
    #[must_use]
    pub fn request_ids(&self) -> Vec<Option<String>> {
        lock(&self.state).request_ids.clone()
    }
}

impl Drop for FakeCommerceService {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn record_request_id(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    lock(&state).request_ids.push(request_id);
    next.run(request).await
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_products(State(state): State<Shared>) -> Json<Vec<Product>> {
    Json(lock(&state).products.clone())
}

async fn fetch_cart(State(state): State<Shared>, headers: HeaderMap) -> Result<Json<Value>, Failure> {
    let state = lock(&state);
    let email = authenticate(&state, &headers)?;
    Ok(Json(state.cart_body(&email)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBody {
    product_id: ProductId,
    quantity: u32,
}

async fn add_to_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddBody>,
) -> Result<Json<Value>, Failure> {
    let mut state = lock(&state);
    let email = authenticate(&state, &headers)?;
    if body.quantity == 0 {
        return Err(Failure(StatusCode::BAD_REQUEST, "Quantity must be positive"));
    }

    let product = state
        .product_mut(&body.product_id)
        .ok_or(Failure(StatusCode::NOT_FOUND, "Product not found"))?;
    if product.stock < body.quantity {
        return Err(Failure(StatusCode::CONFLICT, "Insufficient stock"));
    }
    product.stock -= body.quantity;

    let line_id = CartLineId::new(state.next_id("line-"));
    let cart = state.carts.entry(email.clone()).or_default();
    match cart.iter_mut().find(|(_, id, _)| id == &body.product_id) {
        Some((_, _, quantity)) => *quantity += body.quantity,
        None => cart.push((line_id, body.product_id, body.quantity)),
    }
    Ok(Json(state.cart_body(&email)))
}

async fn remove_from_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(product_id): Path<ProductId>,
) -> Result<Json<Value>, Failure> {
    let mut state = lock(&state);
    let email = authenticate(&state, &headers)?;

    let cart = state.carts.entry(email.clone()).or_default();
    let index = cart
        .iter()
        .position(|(_, id, _)| id == &product_id)
        .ok_or(Failure(StatusCode::NOT_FOUND, "Item not found in cart"))?;
    let (_, _, quantity) = cart.remove(index);
    if let Some(product) = state.product_mut(&product_id) {
        product.stock += quantity;
    }
    Ok(Json(state.cart_body(&email)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderBody {
    shipping_address: String,
}

async fn create_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<OrderBody>,
) -> Result<(StatusCode, Json<Order>), Failure> {
    let mut state = lock(&state);
    let email = authenticate(&state, &headers)?;
    if body.shipping_address.trim().is_empty() {
        return Err(Failure(StatusCode::BAD_REQUEST, "Shipping address is required"));
    }

    let snapshot = state.snapshot(&email);
    if snapshot.is_empty() {
        return Err(Failure(StatusCode::BAD_REQUEST, "Cart is empty"));
    }

    let user_id = state
        .users
        .get(&email)
        .map_or_else(|| UserId::new(email.as_str()), |u| u.id.clone());
    let lines = snapshot
        .lines()
        .iter()
        .map(|line| OrderLine {
            id: Some(OrderLineId::new(line.id.as_str())),
            product: line.product.clone(),
            quantity: line.quantity,
            price: line.product.price,
        })
        .collect();
    let order = Order {
        id: OrderId::new(state.next_id("order-")),
        user_id,
        lines,
        total_price: snapshot.lines().iter().map(CartLine::line_total).sum::<Price>(),
        shipping_address: body.shipping_address,
        payment_status: PaymentStatus::Pending,
        order_status: OrderStatus::Processing,
        created_at: None,
    };

    state.carts.remove(&email);
    state
        .orders
        .entry(email)
        .or_default()
        .push(order.clone());
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(State(state): State<Shared>, headers: HeaderMap) -> Result<Json<Vec<Order>>, Failure> {
    let state = lock(&state);
    let email = authenticate(&state, &headers)?;
    Ok(Json(state.orders.get(&email).cloned().unwrap_or_default()))
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(state): State<Shared>, Json(body): Json<LoginBody>) -> Result<Json<Value>, Failure> {
    let mut state = lock(&state);
    let full_name = match state.users.get(&body.email) {
        Some(user) if user.password == body.password => user.full_name.clone(),
        _ => return Err(Failure(StatusCode::UNAUTHORIZED, "Invalid email or password")),
    };

    let token = state.next_id("token-");
    state.sessions.insert(token.clone(), body.email);
    Ok(Json(json!({ "token": token, "fullName": full_name })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    full_name: String,
    email: String,
    password: String,
}

async fn register(State(state): State<Shared>, Json(body): Json<RegisterBody>) -> Result<StatusCode, Failure> {
    let mut state = lock(&state);
    if state.users.contains_key(&body.email) {
        return Err(Failure(StatusCode::BAD_REQUEST, "User already exists"));
    }

    let id = UserId::new(state.next_id("user-"));
    state.users.insert(
        body.email,
        User {
            id,
            full_name: body.full_name,
            password: body.password,
        },
    );
    Ok(StatusCode::CREATED)
}
