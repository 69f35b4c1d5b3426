//! State and routes of the fake nursery backend

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub type Shared = Arc<Mutex<Backend>>;

type Reply = (StatusCode, Json<Value>);

/// How list endpoints wrap their entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListShape {
    #[default]
    Array,
    Content,
    Data,
    Items,
}

#[derive(Debug, Clone)]
struct Category {
    name: String,
    parent_id: Option<i64>,
}

#[derive(Debug, Clone)]
struct Plant {
    name: String,
    price: f64,
    quantity: i64,
    category_id: i64,
}

#[derive(Debug, Clone)]
struct Sale {
    plant_id: i64,
    quantity: i64,
}

#[derive(Debug)]
pub struct Backend {
    /// (username, password, role)
    users: Vec<(String, String, &'static str)>,
    pub list_shape: ListShape,
    pub restore_stock_on_sale_delete: bool,
    /// Let regular users perform admin-only writes
    pub users_may_mutate: bool,
    /// Answer creations with 201 but no `id`
    pub omit_created_id: bool,
    next_id: i64,
    categories: BTreeMap<i64, Category>,
    plants: BTreeMap<i64, Plant>,
    sales: BTreeMap<i64, Sale>,
    requests: Vec<String>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            users: vec![
                ("admin".into(), "admin123".into(), "admin"),
                ("user".into(), "user123".into(), "user"),
                ("testuser".into(), "test123".into(), "user"),
            ],
            list_shape: ListShape::Array,
            restore_stock_on_sale_delete: true,
            users_may_mutate: false,
            omit_created_id: false,
            next_id: 1,
            categories: BTreeMap::new(),
            plants: BTreeMap::new(),
            sales: BTreeMap::new(),
            requests: Vec::new(),
        }
    }
}

impl Backend {
    /// Id handed to the next created entity
    pub fn with_next_id(mut self, id: i64) -> Self {
        self.next_id = id;
        self
    }

    pub fn with_list_shape(mut self, shape: ListShape) -> Self {
        self.list_shape = shape;
        self
    }

    pub fn without_user(mut self, username: &str) -> Self {
        self.users.retain(|(u, _, _)| u != username);
        self
    }

    pub fn add_category(&mut self, name: &str, parent_id: Option<i64>) -> i64 {
        let id = self.alloc_id();
        self.categories.insert(
            id,
            Category {
                name: name.to_string(),
                parent_id,
            },
        );
        id
    }

    pub fn add_category_with_id(&mut self, id: i64, name: &str, parent_id: Option<i64>) {
        self.categories.insert(
            id,
            Category {
                name: name.to_string(),
                parent_id,
            },
        );
        self.next_id = self.next_id.max(id + 1);
    }

    pub fn add_plant(&mut self, name: &str, category_id: i64, quantity: i64) -> i64 {
        let id = self.alloc_id();
        self.plants.insert(
            id,
            Plant {
                name: name.to_string(),
                price: 10.0,
                quantity,
                category_id,
            },
        );
        id
    }

    pub fn has_category(&self, id: i64) -> bool {
        self.categories.contains_key(&id)
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn plant_count(&self) -> usize {
        self.plants.len()
    }

    pub fn plant_quantity(&self, id: i64) -> Option<i64> {
        self.plants.get(&id).map(|p| p.quantity)
    }

    pub fn sale_count(&self) -> usize {
        self.sales.len()
    }

    /// Every request seen, as `METHOD /path`
    pub fn requests(&self) -> &[String] {
        &self.requests
    }

    fn alloc_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn role_of(&self, headers: &HeaderMap) -> Option<&'static str> {
        let header = headers.get("authorization")?.to_str().ok()?;
        let username = header.strip_prefix("Bearer tok-")?;
        self.users
            .iter()
            .find(|(u, _, _)| u == username)
            .map(|(_, _, role)| *role)
    }

    /// 401 without a session, 403 for a user on an admin-only route
    fn guard(&self, headers: &HeaderMap, admin_only: bool) -> Result<(), Reply> {
        match self.role_of(headers) {
            None => Err(error(StatusCode::UNAUTHORIZED, "Unauthorized")),
            Some("admin") => Ok(()),
            Some(_) if admin_only && !self.users_may_mutate => {
                Err(error(StatusCode::FORBIDDEN, "Forbidden"))
            }
            Some(_) => Ok(()),
        }
    }

    fn shape(&self, entries: Vec<Value>) -> Value {
        match self.list_shape {
            ListShape::Array => Value::Array(entries),
            ListShape::Content => {
                let total = entries.len();
                json!({ "content": entries, "totalElements": total })
            }
            ListShape::Data => json!({ "data": entries }),
            ListShape::Items => json!({ "items": entries }),
        }
    }

    fn category_json(&self, id: i64, category: &Category) -> Value {
        json!({
            "id": id,
            "name": category.name,
            "parentId": category.parent_id,
            "parentName": category
                .parent_id
                .and_then(|p| self.categories.get(&p))
                .map(|p| p.name.clone()),
        })
    }

    /// Top-level categories with their children under `subCategories`
    fn category_tree(&self) -> Vec<Value> {
        self.categories
            .iter()
            .filter(|(_, c)| c.parent_id.is_none())
            .map(|(id, c)| {
                let mut entry = self.category_json(*id, c);
                let children: Vec<Value> = self
                    .categories
                    .iter()
                    .filter(|(_, child)| child.parent_id == Some(*id))
                    .map(|(child_id, child)| self.category_json(*child_id, child))
                    .collect();
                entry["subCategories"] = Value::Array(children);
                entry
            })
            .collect()
    }

    fn plant_json(&self, id: i64, plant: &Plant) -> Value {
        json!({
            "id": id,
            "name": plant.name,
            "price": plant.price,
            "quantity": plant.quantity,
            "category": {
                "id": plant.category_id,
                "name": self.categories.get(&plant.category_id).map(|c| c.name.clone()),
            },
        })
    }

    fn created(&self, body: Value) -> Reply {
        if self.omit_created_id {
            let mut body = body;
            if let Some(obj) = body.as_object_mut() {
                obj.remove("id");
            }
            return (StatusCode::CREATED, Json(body));
        }
        (StatusCode::CREATED, Json(body))
    }
}

fn error(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({ "status": status.as_u16(), "message": message })))
}

fn validate_category_name(name: &str) -> Result<(), Reply> {
    if (3..=10).contains(&name.chars().count()) {
        Ok(())
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": 400,
                "message": "Validation failed",
                "details": { "name": "Category name must be between 3 and 10 characters" },
            })),
        ))
    }
}

fn lock(state: &Shared) -> std::sync::MutexGuard<'_, Backend> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/api/plants", get(list_plants))
        .route("/api/plants/category/:id", post(create_plant))
        .route("/api/plants/:id", get(get_plant).put(update_plant).delete(delete_plant))
        .route("/api/sales/plant/:id", post(create_sale))
        // `page` shares the parameter slot with sale ids
        .route("/api/sales/:id", get(list_sales).delete(delete_sale))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

async fn record(State(state): State<Shared>, request: Request, next: Next) -> Response {
    lock(&state)
        .requests
        .push(format!("{} {}", request.method(), request.uri().path()));
    next.run(request).await
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn login(State(state): State<Shared>, Json(body): Json<LoginBody>) -> Reply {
    let backend = lock(&state);
    let known = backend
        .users
        .iter()
        .any(|(u, p, _)| *u == body.username && *p == body.password);
    if known {
        (StatusCode::OK, Json(json!({ "token": format!("tok-{}", body.username) })))
    } else {
        error(StatusCode::UNAUTHORIZED, "Invalid credentials")
    }
}

async fn list_categories(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, false) {
        return reply;
    }
    (StatusCode::OK, Json(backend.shape(backend.category_tree())))
}

async fn create_category(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, true) {
        return reply;
    }
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    if let Err(reply) = validate_category_name(&name) {
        return reply;
    }
    let parent_id = body.get("parentId").and_then(Value::as_i64);
    if let Some(parent_id) = parent_id {
        if !backend.has_category(parent_id) {
            return error(StatusCode::BAD_REQUEST, "Parent category not found");
        }
    }

    let id = backend.add_category(&name, parent_id);
    let json = backend.category_json(id, &Category { name, parent_id });
    backend.created(json)
}

async fn get_category(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    let backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, false) {
        return reply;
    }
    match backend.categories.get(&id) {
        Some(category) => (StatusCode::OK, Json(backend.category_json(id, category))),
        None => error(StatusCode::NOT_FOUND, "Category not found"),
    }
}

async fn update_category(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    let mut backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, true) {
        return reply;
    }
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    if let Err(reply) = validate_category_name(&name) {
        return reply;
    }
    let Some(category) = backend.categories.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "Category not found");
    };
    category.name = name;
    let category = category.clone();
    (StatusCode::OK, Json(backend.category_json(id, &category)))
}

async fn delete_category(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    let mut backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, true) {
        return reply;
    }
    if !backend.has_category(id) {
        return error(StatusCode::NOT_FOUND, "Category not found");
    }
    let has_dependents = backend.categories.values().any(|c| c.parent_id == Some(id))
        || backend.plants.values().any(|p| p.category_id == id);
    if has_dependents {
        return error(StatusCode::CONFLICT, "Category has sub-categories or plants");
    }
    backend.categories.remove(&id);
    (StatusCode::OK, Json(json!({})))
}

async fn list_plants(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, false) {
        return reply;
    }
    let plants = backend
        .plants
        .iter()
        .map(|(id, p)| backend.plant_json(*id, p))
        .collect();
    (StatusCode::OK, Json(backend.shape(plants)))
}

async fn create_plant(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(category_id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    let mut backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, true) {
        return reply;
    }
    if !backend.has_category(category_id) {
        return error(StatusCode::NOT_FOUND, "Category not found");
    }
    let plant = Plant {
        name: body.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        price: body.get("price").and_then(Value::as_f64).unwrap_or(0.0),
        quantity: body.get("quantity").and_then(Value::as_i64).unwrap_or(0),
        category_id,
    };
    let id = backend.alloc_id();
    backend.plants.insert(id, plant.clone());
    let json = backend.plant_json(id, &plant);
    backend.created(json)
}

async fn get_plant(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, false) {
        return reply;
    }
    match backend.plants.get(&id) {
        Some(plant) => (StatusCode::OK, Json(backend.plant_json(id, plant))),
        None => error(StatusCode::NOT_FOUND, "Plant not found"),
    }
}

async fn update_plant(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    let mut backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, true) {
        return reply;
    }
    let Some(plant) = backend.plants.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "Plant not found");
    };
    if let Some(name) = body.get("name").and_then(Value::as_str) {
        plant.name = name.to_string();
    }
    if let Some(price) = body.get("price").and_then(Value::as_f64) {
        plant.price = price;
    }
    if let Some(quantity) = body.get("quantity").and_then(Value::as_i64) {
        plant.quantity = quantity;
    }
    if let Some(category_id) = body.get("categoryId").and_then(Value::as_i64) {
        plant.category_id = category_id;
    }
    let plant = plant.clone();
    (StatusCode::OK, Json(backend.plant_json(id, &plant)))
}

async fn delete_plant(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    let mut backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, true) {
        return reply;
    }
    match backend.plants.remove(&id) {
        Some(_) => (StatusCode::OK, Json(json!({}))),
        None => error(StatusCode::NOT_FOUND, "Plant not found"),
    }
}

#[derive(Deserialize)]
struct SaleQuery {
    quantity: Option<i64>,
}

async fn create_sale(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(plant_id): Path<i64>,
    Query(query): Query<SaleQuery>,
) -> Reply {
    let mut backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, true) {
        return reply;
    }
    let quantity = query.quantity.unwrap_or(1);
    let Some(plant) = backend.plants.get_mut(&plant_id) else {
        return error(StatusCode::NOT_FOUND, "Plant not found");
    };
    if quantity < 1 || quantity > plant.quantity {
        return error(StatusCode::BAD_REQUEST, "Insufficient stock");
    }
    plant.quantity -= quantity;
    let (name, price) = (plant.name.clone(), plant.price);

    let id = backend.alloc_id();
    backend.sales.insert(id, Sale { plant_id, quantity });
    backend.created(json!({
        "id": id,
        "plant": { "id": plant_id, "name": name },
        "quantity": quantity,
        "totalPrice": price * quantity as f64,
    }))
}

async fn list_sales(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(segment): Path<String>,
) -> Reply {
    let backend = lock(&state);
    if segment != "page" {
        return error(StatusCode::METHOD_NOT_ALLOWED, "Use /api/sales/page");
    }
    if let Err(reply) = backend.guard(&headers, false) {
        return reply;
    }
    let sales: Vec<Value> = backend
        .sales
        .iter()
        .map(|(id, s)| json!({ "id": id, "plant": { "id": s.plant_id }, "quantity": s.quantity }))
        .collect();
    let total = sales.len();
    (StatusCode::OK, Json(json!({ "content": sales, "totalElements": total })))
}

async fn delete_sale(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(segment): Path<String>,
) -> Reply {
    let mut backend = lock(&state);
    if let Err(reply) = backend.guard(&headers, true) {
        return reply;
    }
    let Ok(id) = segment.parse::<i64>() else {
        return error(StatusCode::BAD_REQUEST, "Invalid sale id");
    };
    let Some(sale) = backend.sales.remove(&id) else {
        return error(StatusCode::NOT_FOUND, "Sale not found");
    };
    if backend.restore_stock_on_sale_delete {
        if let Some(plant) = backend.plants.get_mut(&sale.plant_id) {
            plant.quantity += sale.quantity;
        }
    }
    (StatusCode::OK, Json(json!({})))
}
