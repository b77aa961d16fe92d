//! In-memory commerce service used by unit tests.
//!
//! Behaves like the real service (tokens, per-user carts, stock that goes
//! down on add and back up on remove) and adds the knobs tests need: call
//! counters, injected failures and gates that hold a response back until
//! released.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use shopfront_core::{
    CartLine, CartLineId, CartSnapshot, Email, Order, OrderId, OrderLine, OrderLineId,
    OrderStatus, PaymentStatus, Price, Product, ProductId, ShippingAddress, UserId,
};

use crate::api::{ApiError, CommerceApi, LoginResponse};

/// Build a catalog product priced in cents.
pub fn product(id: &str, cents: i64, stock: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        price: Price::from_cents(cents).unwrap(),
        image: format!("https://img.example.com/{id}.png"),
        stock,
    }
}

/// Holds one call's response until released.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    released: Notify,
}

impl Gate {
    /// Wait until the held call has computed its response.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held call return.
    pub fn release(&self) {
        self.released.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.released.notified().await;
    }
}

struct FakeUser {
    password: String,
    full_name: Option<String>,
}

#[derive(Default)]
struct FakeState {
    products: Vec<Product>,
    /// token -> (line id, product id, quantity)
    carts: HashMap<String, Vec<(CartLineId, ProductId, u32)>>,
    orders: HashMap<String, Vec<Order>>,
    users: HashMap<String, FakeUser>,
    next_id: u64,
    omit_login_token: bool,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn product_mut(&mut self, product_id: &ProductId) -> Result<&mut Product, ApiError> {
        self.products
            .iter_mut()
            .find(|p| &p.id == product_id)
            .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))
    }

    fn check_token(&self, token: &SecretString) -> Result<String, ApiError> {
        let token = token.expose_secret();
        if self.carts.contains_key(token) {
            Ok(token.to_string())
        } else {
            Err(ApiError::Unauthorized("Invalid token".to_string()))
        }
    }

    fn snapshot(&self, token: &str) -> CartSnapshot {
        let lines = self
            .carts
            .get(token)
            .into_iter()
            .flatten()
            .filter_map(|(line_id, product_id, quantity)| {
                self.products
                    .iter()
                    .find(|p| &p.id == product_id)
                    .map(|product| CartLine {
                        id: line_id.clone(),
                        product: product.clone(),
                        quantity: *quantity,
                    })
            })
            .collect();
        CartSnapshot::new(lines)
    }
}

/// Fake [`CommerceApi`].
#[derive(Default)]
pub struct FakeCommerceApi {
    state: Mutex<FakeState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<VecDeque<ApiError>>,
    gates: Mutex<HashMap<&'static str, Arc<Gate>>>,
}

impl FakeCommerceApi {
    pub fn with_products(products: Vec<Product>) -> Self {
        let api = Self::default();
        api.state.lock().unwrap().products = products;
        api
    }

    /// Accept `token` as a valid credential with an empty cart.
    pub fn issue_token(&self, token: &str) {
        self.state
            .lock()
            .unwrap()
            .carts
            .entry(token.to_string())
            .or_default();
    }

    /// Stop accepting `token`.
    pub fn revoke(&self, token: &str) {
        self.state.lock().unwrap().carts.remove(token);
    }

    /// Put units straight into a cart, bypassing stock.
    pub fn seed_cart(&self, token: &str, product_id: &str, quantity: u32) {
        let mut state = self.state.lock().unwrap();
        let line_id = CartLineId::new(state.next_id("line"));
        state.carts.entry(token.to_string()).or_default().push((
            line_id,
            ProductId::new(product_id),
            quantity,
        ));
    }

    pub fn set_stock(&self, product_id: &ProductId, stock: u32) {
        self.state.lock().unwrap().product_mut(product_id).unwrap().stock = stock;
    }

    pub fn add_user(&self, email: &str, password: &str, full_name: Option<&str>) {
        self.state.lock().unwrap().users.insert(
            email.to_string(),
            FakeUser {
                password: password.to_string(),
                full_name: full_name.map(str::to_string),
            },
        );
    }

    /// Answer logins without a token.
    pub fn omit_login_token(&self) {
        self.state.lock().unwrap().omit_login_token = true;
    }

    /// Fail the next call, whatever it is.
    pub fn fail_next(&self, error: ApiError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Hold the next call to `method` until the returned gate is released.
    pub fn hold(&self, method: &'static str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.lock().unwrap().insert(method, Arc::clone(&gate));
        gate
    }

    /// Number of calls made to `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    /// Total number of calls made to any method.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn cart(&self, token: &str) -> CartSnapshot {
        self.state.lock().unwrap().snapshot(token)
    }

    /// Record the call and run `f` against the state, then pass any gate.
    async fn call<T>(
        &self,
        method: &'static str,
        f: impl FnOnce(&mut FakeState) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;

        let failure = self.failures.lock().unwrap().pop_front();
        let result = match failure {
            Some(err) => Err(err),
            None => f(&mut self.state.lock().unwrap()),
        };

        let gate = self.gates.lock().unwrap().remove(method);
        if let Some(gate) = gate {
            gate.pass().await;
        }
        result
    }
}

impl CommerceApi for FakeCommerceApi {
    async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        self.call("list_products", |state| Ok(state.products.clone()))
            .await
    }

    async fn fetch_cart(&self, token: &SecretString) -> Result<CartSnapshot, ApiError> {
        self.call("fetch_cart", |state| {
            let token = state.check_token(token)?;
            Ok(state.snapshot(&token))
        })
        .await
    }

    async fn add_to_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot, ApiError> {
        self.call("add_to_cart", |state| {
            let token = state.check_token(token)?;
            let product = state.product_mut(product_id)?;
            if product.stock < quantity {
                return Err(ApiError::Rejected("Insufficient stock".to_string()));
            }
            product.stock -= quantity;

            let line_id = CartLineId::new(state.next_id("line"));
            let cart = state.carts.entry(token.clone()).or_default();
            match cart.iter_mut().find(|(_, id, _)| id == product_id) {
                Some((_, _, existing)) => *existing += quantity,
                None => cart.push((line_id, product_id.clone(), quantity)),
            }
            Ok(state.snapshot(&token))
        })
        .await
    }

    async fn remove_from_cart(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<CartSnapshot, ApiError> {
        self.call("remove_from_cart", |state| {
            let token = state.check_token(token)?;
            let cart = state.carts.entry(token.clone()).or_default();
            let index = cart
                .iter()
                .position(|(_, id, _)| id == product_id)
                .ok_or_else(|| ApiError::NotFound("Item not in cart".to_string()))?;
            let (_, _, quantity) = cart.remove(index);
            if let Ok(product) = state.product_mut(product_id) {
                product.stock += quantity;
            }
            Ok(state.snapshot(&token))
        })
        .await
    }

    async fn create_order(
        &self,
        token: &SecretString,
        shipping_address: &ShippingAddress,
    ) -> Result<Order, ApiError> {
        self.call("create_order", |state| {
            let token = state.check_token(token)?;
            let snapshot = state.snapshot(&token);
            if snapshot.is_empty() {
                return Err(ApiError::Status {
                    status: 400,
                    message: "Cart is empty".to_string(),
                });
            }

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
                id: OrderId::new(state.next_id("order")),
                user_id: UserId::new(format!("user-{token}")),
                lines,
                total_price: snapshot.total_price(),
                shipping_address: shipping_address.as_str().to_string(),
                payment_status: PaymentStatus::Pending,
                order_status: OrderStatus::Processing,
                created_at: None,
            };

            state.carts.insert(token.clone(), Vec::new());
            state
                .orders
                .entry(token)
                .or_default()
                .push(order.clone());
            Ok(order)
        })
        .await
    }

    async fn list_orders(&self, token: &SecretString) -> Result<Vec<Order>, ApiError> {
        self.call("list_orders", |state| {
            let token = state.check_token(token)?;
            Ok(state.orders.get(&token).cloned().unwrap_or_default())
        })
        .await
    }

    async fn login(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<LoginResponse, ApiError> {
        self.call("login", |state| {
            let full_name = match state.users.get(email.as_str()) {
                Some(user) if user.password == password.expose_secret() => user.full_name.clone(),
                _ => return Err(ApiError::Unauthorized("Invalid credentials".to_string())),
            };

            let token = state.next_id("token");
            state.carts.entry(token.clone()).or_default();
            Ok(LoginResponse {
                token: (!state.omit_login_token).then_some(token),
                full_name,
            })
        })
        .await
    }

    async fn register(
        &self,
        full_name: &str,
        email: &Email,
        password: &SecretString,
    ) -> Result<(), ApiError> {
        self.call("register", |state| {
            if state.users.contains_key(email.as_str()) {
                return Err(ApiError::Rejected("User already exists".to_string()));
            }
            state.users.insert(
                email.as_str().to_string(),
                FakeUser {
                    password: password.expose_secret().to_string(),
                    full_name: Some(full_name.to_string()),
                },
            );
            Ok(())
        })
        .await
    }
}
