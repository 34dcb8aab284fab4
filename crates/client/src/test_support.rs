//! In-process fakes of the remote services for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use emporium_core::{
    CartLine, CartLines, Email, ManagedUser, NewProduct, Price, Product, ProductId, Review,
    RoleTag, UserId, UserRecord,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use crate::api::{
    ApiError, AuthApi, CartApi, CatalogApi, Credentials, CredentialSink, LoginResponse,
    NewAccount, UserAdminApi,
};
use crate::storage::{KeyValueStore, MemoryStore, StorageError};

pub fn status_error(status: u16) -> ApiError {
    ApiError::Status {
        status,
        message: format!("status {status}"),
    }
}

pub fn user(id: &str, roles: &[&str]) -> UserRecord {
    UserRecord {
        id: UserId::new(id),
        email: Email::parse(&format!("user{id}@example.com")).unwrap(),
        username: Some(format!("user{id}")),
        roles: roles.iter().map(|r| RoleTag::from(*r)).collect(),
    }
}

pub fn product(id: &str, price: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        description: None,
        category: None,
        price: Price::from(price),
        image_url: Some(format!("/img/{id}.jpg")),
        images: Vec::new(),
    }
}

pub fn line(id: &str, price: u32, quantity: u32) -> CartLine {
    product(id, price).to_cart_line(quantity)
}

// =============================================================================
// Auth
// =============================================================================

pub enum AuthReply {
    Ok(LoginResponse),
    Status(u16),
}

pub struct FakeAuth {
    reply: Mutex<AuthReply>,
    pub login_calls: AtomicUsize,
    pub signups: Mutex<Vec<NewAccount>>,
}

impl FakeAuth {
    pub fn replying(token: Option<&str>, user: Option<UserRecord>) -> Self {
        Self::with_reply(AuthReply::Ok(LoginResponse {
            token: token.map(str::to_owned),
            user,
        }))
    }

    pub fn with_reply(reply: AuthReply) -> Self {
        Self {
            reply: Mutex::new(reply),
            login_calls: AtomicUsize::new(0),
            signups: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reply(&self, reply: AuthReply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for FakeAuth {
    async fn login(&self, _credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.reply.lock().unwrap() {
            AuthReply::Ok(response) => Ok(response.clone()),
            AuthReply::Status(status) => Err(status_error(*status)),
        }
    }

    async fn signup(&self, account: &NewAccount) -> Result<(), ApiError> {
        self.signups.lock().unwrap().push(account.clone());
        Ok(())
    }
}

/// Records the credential the session pushes to the transport.
#[derive(Default)]
pub struct RecordingSink {
    current: Mutex<Option<String>>,
}

impl RecordingSink {
    pub fn current(&self) -> Option<String> {
        self.current.lock().unwrap().clone()
    }
}

impl CredentialSink for RecordingSink {
    fn set_credential(&self, token: &SecretString) {
        *self.current.lock().unwrap() = Some(token.expose_secret().to_owned());
    }

    fn clear_credential(&self) {
        *self.current.lock().unwrap() = None;
    }
}

/// Memory store whose reads or writes of chosen keys can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_set: Mutex<Option<String>>,
    pub fail_reads: AtomicBool,
}

impl FlakyStore {
    pub fn fail_set_of(&self, key: &str) {
        *self.fail_set.lock().unwrap() = Some(key.to_owned());
    }

    fn injected() -> StorageError {
        StorageError::Io(std::io::Error::other("injected failure"))
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_set.lock().unwrap().as_deref() == Some(key) {
            return Err(Self::injected());
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Fetch,
    Increment,
    SetQuantity,
    Remove,
    Clear,
    Checkout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartCall {
    Fetch,
    Increment(ProductId, u32),
    SetQuantity(ProductId, u32),
    Remove(ProductId),
    Clear,
    Checkout,
}

/// Pauses the next call of an operation until released.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// Server-side cart kept in memory.
#[derive(Default)]
pub struct FakeCart {
    server: Mutex<CartLines>,
    calls: Mutex<Vec<CartCall>>,
    failures: Mutex<HashMap<Op, u16>>,
    gates: Mutex<HashMap<Op, Gate>>,
    checkout_redirect: Mutex<Option<String>>,
}

impl FakeCart {
    pub fn with_lines(lines: Vec<CartLine>) -> Self {
        let cart = Self::default();
        *cart.server.lock().unwrap() = CartLines::from_remote(lines).0;
        cart
    }

    pub fn server_lines(&self) -> CartLines {
        self.server.lock().unwrap().clone()
    }

    pub fn set_server_lines(&self, lines: Vec<CartLine>) {
        *self.server.lock().unwrap() = CartLines::from_remote(lines).0;
    }

    pub fn calls(&self) -> Vec<CartCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_calls(&self) -> Vec<CartCall> {
        self.calls()
            .into_iter()
            .filter(|c| *c != CartCall::Fetch)
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == CartCall::Fetch).count()
    }

    pub fn fail(&self, op: Op, status: u16) {
        self.failures.lock().unwrap().insert(op, status);
    }

    pub fn heal(&self, op: Op) {
        self.failures.lock().unwrap().remove(&op);
    }

    pub fn hold(&self, op: Op) -> Gate {
        let gate = Gate::default();
        self.gates.lock().unwrap().insert(op, gate.clone());
        gate
    }

    pub fn redirect_checkout_to(&self, url: &str) {
        *self.checkout_redirect.lock().unwrap() = Some(url.to_owned());
    }

    async fn enter(&self, op: Op, call: CartCall) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        let gate = self.gates.lock().unwrap().remove(&op);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        match self.failures.lock().unwrap().get(&op) {
            Some(status) => Err(status_error(*status)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CartApi for FakeCart {
    async fn fetch_cart(&self) -> Result<Vec<CartLine>, ApiError> {
        // The reply reflects the server at the time the request arrived.
        let snapshot = self.server_lines();
        self.enter(Op::Fetch, CartCall::Fetch).await?;
        Ok(snapshot.iter().cloned().collect())
    }

    async fn increment(&self, product_id: &ProductId, delta: u32) -> Result<(), ApiError> {
        self.enter(Op::Increment, CartCall::Increment(product_id.clone(), delta))
            .await?;
        // Unknown products are priced at 10.
        let added = line(product_id.as_str(), 10, delta);
        self.server.lock().unwrap().add(added).unwrap();
        Ok(())
    }

    async fn set_quantity(&self, product_id: &ProductId, quantity: u32) -> Result<(), ApiError> {
        self.enter(Op::SetQuantity, CartCall::SetQuantity(product_id.clone(), quantity))
            .await?;
        let _ = self.server.lock().unwrap().set_quantity(product_id, quantity);
        Ok(())
    }

    async fn remove(&self, product_id: &ProductId) -> Result<(), ApiError> {
        self.enter(Op::Remove, CartCall::Remove(product_id.clone()))
            .await?;
        self.server.lock().unwrap().remove(product_id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), ApiError> {
        self.enter(Op::Clear, CartCall::Clear).await?;
        self.server.lock().unwrap().clear();
        Ok(())
    }

    async fn start_checkout(&self) -> Result<Option<String>, ApiError> {
        self.enter(Op::Checkout, CartCall::Checkout).await?;
        Ok(self.checkout_redirect.lock().unwrap().clone())
    }
}

// =============================================================================
// Catalog and user management
// =============================================================================

#[derive(Default)]
pub struct FakeCatalog {
    pub added: Mutex<Vec<NewProduct>>,
    pub deleted: Mutex<Vec<ProductId>>,
    pub users: Mutex<Vec<ManagedUser>>,
    pub user_calls: Mutex<Vec<String>>,
    pub managers: Mutex<Vec<NewAccount>>,
}

impl FakeCatalog {
    pub fn user_calls(&self) -> Vec<String> {
        self.user_calls.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.added.lock().unwrap().len()
            + self.deleted.lock().unwrap().len()
            + self.user_calls.lock().unwrap().len()
            + self.managers.lock().unwrap().len()
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn categories(&self) -> Result<Vec<String>, ApiError> {
        Ok(vec!["All".to_string(), "Books".to_string()])
    }

    async fn products(&self, _category: &str) -> Result<Vec<Product>, ApiError> {
        Ok(vec![product("p1", 10)])
    }

    async fn product(&self, id: &ProductId) -> Result<Product, ApiError> {
        Ok(product(id.as_str(), 10))
    }

    async fn reviews(&self, _id: &ProductId) -> Result<Vec<Review>, ApiError> {
        Ok(Vec::new())
    }

    async fn add_product(&self, product: &NewProduct) -> Result<(), ApiError> {
        self.added.lock().unwrap().push(product.clone());
        Ok(())
    }

    async fn delete_product(&self, id: &ProductId) -> Result<(), ApiError> {
        self.deleted.lock().unwrap().push(id.clone());
        Ok(())
    }
}

#[async_trait]
impl UserAdminApi for FakeCatalog {
    async fn list_users(&self) -> Result<Vec<ManagedUser>, ApiError> {
        self.user_calls.lock().unwrap().push("list".to_string());
        Ok(self.users.lock().unwrap().clone())
    }

    async fn flag_user(&self, id: &UserId) -> Result<(), ApiError> {
        self.user_calls.lock().unwrap().push(format!("flag {id}"));
        Ok(())
    }

    async fn unflag_user(&self, id: &UserId) -> Result<(), ApiError> {
        self.user_calls.lock().unwrap().push(format!("unflag {id}"));
        Ok(())
    }

    async fn delete_user(&self, id: &UserId) -> Result<(), ApiError> {
        self.user_calls.lock().unwrap().push(format!("delete {id}"));
        Ok(())
    }

    async fn register_manager(&self, account: &NewAccount) -> Result<(), ApiError> {
        self.managers.lock().unwrap().push(account.clone());
        Ok(())
    }
}
