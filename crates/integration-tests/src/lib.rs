//! Integration tests for the Emporium storefront client.
//!
//! The tests drive a real [`AppContext`] over HTTP against [`FakeBackend`],
//! an in-process axum server speaking the auth, product and admin service
//! protocols. Nothing external needs to be running.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p emporium-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use emporium_client::{AppContext, ClientConfig};
use emporium_core::{
    CartLine, Email, ManagedUser, NewProduct, Price, Product, ProductId, Review, RoleTag,
    UserId, UserRecord,
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Password every seeded account accepts.
pub const PASSWORD: &str = "secret";

/// Seeded shopper account.
pub const SHOPPER: &str = "shopper@example.com";

/// Seeded manager account.
pub const MANAGER: &str = "manager@example.com";

/// Seeded admin account.
pub const ADMIN: &str = "admin@example.com";

/// Request line of an authoritative cart fetch.
pub const CART_FETCH: &str = "GET /product/cart";

type Reply = Result<Json<Value>, (StatusCode, String)>;

struct Account {
    user: UserRecord,
    flagged: bool,
}

#[derive(Default)]
struct Backend {
    accounts: Vec<Account>,
    sessions: HashMap<String, UserId>,
    carts: HashMap<UserId, Vec<CartLine>>,
    products: BTreeMap<ProductId, Product>,
    next_id: u64,
    checkout_redirect: Option<String>,
    cart_offline: bool,
    cart_fetch_delay: Duration,
    hits: Vec<String>,
}

impl Backend {
    fn seeded() -> Self {
        let mut backend = Self {
            next_id: 100,
            ..Self::default()
        };
        for (id, email, roles) in [
            ("1", SHOPPER, vec!["ROLE_USER"]),
            ("2", MANAGER, vec!["ROLE_USER", "ROLE_MANAGER"]),
            ("3", ADMIN, vec!["ROLE_USER", "ROLE_ADMIN"]),
        ] {
            backend.accounts.push(Account {
                user: UserRecord {
                    id: UserId::new(id),
                    email: Email::parse(email).unwrap(),
                    username: Some(email.split('@').next().unwrap_or(email).to_string()),
                    roles: roles.into_iter().map(RoleTag::from).collect(),
                },
                flagged: false,
            });
        }
        for (id, name, category, price) in [
            ("10", "Lamp", "Home", 12),
            ("11", "Rug", "Home", 80),
            ("12", "Trowel", "Garden", 9),
        ] {
            backend.products.insert(
                ProductId::new(id),
                Product {
                    id: ProductId::new(id),
                    name: name.to_string(),
                    description: Some(format!("A fine {}", name.to_lowercase())),
                    category: Some(category.to_string()),
                    price: Price::from(price),
                    image_url: Some(format!("/img/{id}.jpg")),
                    images: Vec::new(),
                },
            );
        }
        backend
    }

    fn principal(&self, headers: &HeaderMap) -> Result<&Account, (StatusCode, String)> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "missing token".to_string()))?;
        let id = self
            .sessions
            .get(token)
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "unknown token".to_string()))?;
        self.accounts
            .iter()
            .find(|account| &account.user.id == id)
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "account deleted".to_string()))
    }

    fn require_role(&self, headers: &HeaderMap, roles: &[&str]) -> Result<(), (StatusCode, String)> {
        let account = self.principal(headers)?;
        if roles
            .iter()
            .any(|role| account.user.roles.contains(&RoleTag::from(*role)))
        {
            Ok(())
        } else {
            Err((StatusCode::FORBIDDEN, "forbidden".to_string()))
        }
    }

    fn cart_of(&mut self, headers: &HeaderMap) -> Result<&mut Vec<CartLine>, (StatusCode, String)> {
        if self.cart_offline {
            return Err((StatusCode::SERVICE_UNAVAILABLE, "cart offline".to_string()));
        }
        let id = self.principal(headers)?.user.id.clone();
        Ok(self.carts.entry(id).or_default())
    }
}

type Shared = Arc<Mutex<Backend>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Backend> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process storefront backend.
pub struct FakeBackend {
    base_url: String,
    state: Shared,
}

impl FakeBackend {
    /// Start the backend on an ephemeral local port.
    pub async fn spawn() -> Self {
        let state: Shared = Arc::new(Mutex::new(Backend::seeded()));
        let app = router(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Base URL the client should be configured with.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A started client context whose session lives in `data_dir`.
    pub fn context(&self, data_dir: &Path) -> AppContext {
        let mut config = ClientConfig::for_base_url(&self.base_url).unwrap();
        config.data_dir = data_dir.to_path_buf();
        let ctx = AppContext::new(config).unwrap();
        let _sync = ctx.start();
        ctx
    }

    /// Server-side cart of the account with `email`.
    pub fn cart_of(&self, email: &str) -> Vec<CartLine> {
        let backend = lock(&self.state);
        backend
            .accounts
            .iter()
            .find(|account| account.user.email.as_str() == email)
            .and_then(|account| backend.carts.get(&account.user.id).cloned())
            .unwrap_or_default()
    }

    /// Make checkout answer with a payment redirect.
    pub fn set_checkout_redirect(&self, url: &str) {
        lock(&self.state).checkout_redirect = Some(url.to_string());
    }

    /// Make every cart request fail with 503.
    pub fn set_cart_offline(&self, offline: bool) {
        lock(&self.state).cart_offline = offline;
    }

    /// Answer cart fetches `delay` after reading the cart.
    pub fn set_cart_fetch_delay(&self, delay: Duration) {
        lock(&self.state).cart_fetch_delay = delay;
    }

    /// Whether a product with `id` exists.
    pub fn has_product(&self, id: &str) -> bool {
        lock(&self.state).products.contains_key(&ProductId::new(id))
    }

    /// Sign `ctx` in as `email` and wait for the cart load the new session
    /// triggers to land, so later mutations cannot race it.
    pub async fn sign_in(&self, ctx: &AppContext, email: &str) {
        let before = self.hits(CART_FETCH);
        ctx.session()
            .login(email, SecretString::from(PASSWORD))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.hits(CART_FETCH) == before || ctx.cart().is_loading() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("cart never loaded for {email}"));
    }

    /// Number of requests whose `METHOD /path` starts with `prefix`.
    pub fn hits(&self, prefix: &str) -> usize {
        lock(&self.state)
            .hits
            .iter()
            .filter(|path| path.starts_with(prefix))
            .count()
    }
}

/// Wait until the cart holds `count` units and no load is in flight.
pub async fn settle_cart(ctx: &AppContext, count: u64) {
    let mut rx = ctx.cart().subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|state| state.count() == count && !state.is_loading()),
    )
    .await
    .unwrap_or_else(|_| panic!("cart never reached {count} units"))
    .unwrap();
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/signup", post(signup))
        .route("/product/categories", get(categories))
        .route("/product/list", get(list_products))
        .route("/product/category/{name}", get(products_in_category))
        .route("/product/reviews/{id}", get(reviews))
        .route("/product/add", post(add_product))
        .route("/product/cart", get(fetch_cart).delete(clear_cart))
        .route("/product/cart/items", post(add_to_cart))
        .route(
            "/product/cart/items/{id}",
            patch(set_line_quantity).delete(remove_line),
        )
        .route("/product/checkout", post(checkout))
        .route("/product/{id}", get(product).delete(delete_product))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}/flag", put(flag_user))
        .route("/admin/users/{id}/unflag", put(unflag_user))
        .route("/admin/users/{id}", delete(delete_user))
        .route("/admin/managers", post(register_manager))
        .layer(axum::middleware::from_fn_with_state(state.clone(), record_hit))
        .with_state(state)
}

async fn record_hit(
    State(state): State<Shared>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let hit = format!("{} {}", request.method(), request.uri().path());
    lock(&state).hits.push(hit);
    next.run(request).await
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(state): State<Shared>, Json(body): Json<LoginBody>) -> Reply {
    let mut backend = lock(&state);
    let user = backend
        .accounts
        .iter()
        .find(|account| account.user.email.as_str() == body.email)
        .filter(|_| body.password == PASSWORD)
        .map(|account| account.user.clone())
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "bad credentials".to_string()))?;
    backend.next_id += 1;
    let token = format!("tok-{}", backend.next_id);
    backend.sessions.insert(token.clone(), user.id.clone());
    Ok(Json(json!({ "token": token, "user": user })))
}

#[derive(Deserialize)]
struct SignupBody {
    email: String,
    username: String,
}

async fn signup(State(state): State<Shared>, Json(body): Json<SignupBody>) -> Reply {
    let mut backend = lock(&state);
    if backend
        .accounts
        .iter()
        .any(|account| account.user.email.as_str() == body.email)
    {
        return Err((StatusCode::CONFLICT, "email taken".to_string()));
    }
    backend.next_id += 1;
    let user = UserRecord {
        id: UserId::from(backend.next_id),
        email: Email::parse(&body.email)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
        username: Some(body.username),
        roles: std::iter::once(RoleTag::from("ROLE_USER")).collect(),
    };
    backend.accounts.push(Account {
        user,
        flagged: false,
    });
    Ok(Json(json!({})))
}

// =============================================================================
// Catalog
// =============================================================================

async fn categories(State(state): State<Shared>) -> Reply {
    let backend = lock(&state);
    let mut names: Vec<&str> = backend
        .products
        .values()
        .filter_map(|product| product.category.as_deref())
        .collect();
    names.sort_unstable();
    names.dedup();
    Ok(Json(json!(names)))
}

async fn list_products(State(state): State<Shared>) -> Reply {
    let backend = lock(&state);
    Ok(Json(json!(backend.products.values().collect::<Vec<_>>())))
}

async fn products_in_category(
    State(state): State<Shared>,
    UrlPath(name): UrlPath<String>,
) -> Reply {
    let backend = lock(&state);
    let products: Vec<&Product> = backend
        .products
        .values()
        .filter(|product| {
            product
                .category
                .as_deref()
                .is_some_and(|category| category.eq_ignore_ascii_case(&name))
        })
        .collect();
    Ok(Json(json!(products)))
}

async fn product(State(state): State<Shared>, UrlPath(id): UrlPath<String>) -> Reply {
    let backend = lock(&state);
    backend
        .products
        .get(&ProductId::new(id))
        .map(|product| Json(json!(product)))
        .ok_or_else(|| (StatusCode::NOT_FOUND, "no such product".to_string()))
}

async fn reviews(UrlPath(id): UrlPath<String>) -> Reply {
    let reviews = vec![Review {
        user: "shopper".to_string(),
        rating: 5,
        comment: format!("Love product {id}"),
    }];
    Ok(Json(json!(reviews)))
}

#[derive(Deserialize)]
struct AddProductBody {
    name: String,
    description: String,
    category: String,
    price: Price,
    images: Vec<String>,
}

async fn add_product(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddProductBody>,
) -> Reply {
    let mut backend = lock(&state);
    backend.require_role(&headers, &["ROLE_MANAGER", "ROLE_ADMIN"])?;
    backend.next_id += 1;
    let id = ProductId::from(backend.next_id);
    let created = NewProduct {
        name: body.name,
        description: body.description,
        category: body.category,
        price: body.price,
        images: body.images,
    };
    backend.products.insert(
        id.clone(),
        Product {
            id: id.clone(),
            name: created.name,
            description: Some(created.description),
            category: Some(created.category),
            price: created.price,
            image_url: created.images.first().cloned(),
            images: created.images,
        },
    );
    Ok(Json(json!({ "id": id })))
}

async fn delete_product(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Reply {
    let mut backend = lock(&state);
    backend.require_role(&headers, &["ROLE_ADMIN"])?;
    backend
        .products
        .remove(&ProductId::new(id))
        .map(|_| Json(json!({})))
        .ok_or_else(|| (StatusCode::NOT_FOUND, "no such product".to_string()))
}

// =============================================================================
// Cart
// =============================================================================

async fn fetch_cart(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let (lines, delay) = {
        let mut backend = lock(&state);
        let delay = backend.cart_fetch_delay;
        (backend.cart_of(&headers)?.clone(), delay)
    };
    // The reply reflects the cart as it was when the request arrived.
    tokio::time::sleep(delay).await;
    Ok(Json(json!({ "items": lines })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddToCartBody {
    product_id: ProductId,
    quantity: u32,
}

async fn add_to_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddToCartBody>,
) -> Reply {
    let mut backend = lock(&state);
    let product = backend
        .products
        .get(&body.product_id)
        .cloned()
        .ok_or_else(|| (StatusCode::NOT_FOUND, "no such product".to_string()))?;
    let cart = backend.cart_of(&headers)?;
    match cart.iter_mut().find(|line| line.product_id == body.product_id) {
        Some(line) => line.quantity += body.quantity,
        None => cart.push(product.to_cart_line(body.quantity)),
    }
    Ok(Json(json!({})))
}

#[derive(Deserialize)]
struct QuantityBody {
    quantity: u32,
}

async fn set_line_quantity(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<QuantityBody>,
) -> Reply {
    let mut backend = lock(&state);
    let cart = backend.cart_of(&headers)?;
    let line = cart
        .iter_mut()
        .find(|line| line.product_id.as_str() == id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "not in cart".to_string()))?;
    line.quantity = body.quantity;
    Ok(Json(json!({})))
}

async fn remove_line(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Reply {
    let mut backend = lock(&state);
    backend
        .cart_of(&headers)?
        .retain(|line| line.product_id.as_str() != id);
    Ok(Json(json!({})))
}

async fn clear_cart(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut backend = lock(&state);
    backend.cart_of(&headers)?.clear();
    Ok(Json(json!({})))
}

async fn checkout(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut backend = lock(&state);
    let redirect = backend.checkout_redirect.clone();
    let cart = backend.cart_of(&headers)?;
    if cart.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "cart is empty".to_string()));
    }
    match redirect {
        Some(url) => Ok(Json(json!({ "redirectUrl": url }))),
        None => {
            cart.clear();
            Ok(Json(json!({ "status": "completed" })))
        }
    }
}

// =============================================================================
// Admin
// =============================================================================

async fn list_users(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let backend = lock(&state);
    backend.require_role(&headers, &["ROLE_MANAGER", "ROLE_ADMIN"])?;
    let users: Vec<ManagedUser> = backend
        .accounts
        .iter()
        .map(|account| ManagedUser {
            id: account.user.id.clone(),
            email: account.user.email.clone(),
            username: account.user.username.clone(),
            flagged: account.flagged,
            roles: account.user.roles.clone(),
        })
        .collect();
    Ok(Json(json!(users)))
}

fn set_flag(backend: &mut Backend, id: &str, flagged: bool) -> Reply {
    let account = backend
        .accounts
        .iter_mut()
        .find(|account| account.user.id.as_str() == id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "no such user".to_string()))?;
    account.flagged = flagged;
    Ok(Json(json!({})))
}

async fn flag_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Reply {
    let mut backend = lock(&state);
    backend.require_role(&headers, &["ROLE_MANAGER", "ROLE_ADMIN"])?;
    set_flag(&mut backend, &id, true)
}

async fn unflag_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Reply {
    let mut backend = lock(&state);
    backend.require_role(&headers, &["ROLE_ADMIN"])?;
    set_flag(&mut backend, &id, false)
}

async fn delete_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Reply {
    let mut backend = lock(&state);
    backend.require_role(&headers, &["ROLE_ADMIN"])?;
    let before = backend.accounts.len();
    backend.accounts.retain(|account| account.user.id.as_str() != id);
    if backend.accounts.len() == before {
        return Err((StatusCode::NOT_FOUND, "no such user".to_string()));
    }
    Ok(Json(json!({})))
}

#[derive(Deserialize)]
struct ManagerBody {
    email: String,
    username: String,
}

async fn register_manager(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<ManagerBody>,
) -> Reply {
    let mut backend = lock(&state);
    backend.require_role(&headers, &["ROLE_ADMIN"])?;
    backend.next_id += 1;
    let user = UserRecord {
        id: UserId::from(backend.next_id),
        email: Email::parse(&body.email).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
        username: Some(body.username),
        roles: ["ROLE_USER", "ROLE_MANAGER"]
            .into_iter()
            .map(RoleTag::from)
            .collect(),
    };
    backend.accounts.push(Account {
        user,
        flagged: false,
    });
    Ok(Json(json!({})))
}
