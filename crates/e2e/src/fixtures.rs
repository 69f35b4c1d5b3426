//! Fixture lifecycle: create prerequisite entities, track them, remove them
//!
//! Creation is strict: one request, no retry, and a non-success status is an
//! error the caller inspects (negative tests expect it). Deletion is
//! best-effort: every failure is logged and absorbed so cleanup can never
//! fail a scenario that otherwise passed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiResponse};
use crate::auth::AuthSessionCache;
use crate::error::{E2eError, E2eResult};
use crate::listing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureKind {
    Category,
    Plant,
    Sale,
}

impl FixtureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixtureKind::Category => "category",
            FixtureKind::Plant => "plant",
            FixtureKind::Sale => "sale",
        }
    }

    /// Path of a single entity
    pub fn item_path(&self, id: i64) -> String {
        match self {
            FixtureKind::Category => format!("/api/categories/{}", id),
            FixtureKind::Plant => format!("/api/plants/{}", id),
            FixtureKind::Sale => format!("/api/sales/{}", id),
        }
    }

    /// Endpoint listing every entity of this kind
    pub fn list_endpoint(&self) -> &'static str {
        match self {
            FixtureKind::Category => "/api/categories",
            FixtureKind::Plant => "/api/plants",
            FixtureKind::Sale => "/api/sales/page?size=1000",
        }
    }

    /// Kind of the owning entity, and the payload field that may carry its id
    fn parent_rule(&self) -> (FixtureKind, &'static str) {
        match self {
            FixtureKind::Category => (FixtureKind::Category, "parentId"),
            FixtureKind::Plant => (FixtureKind::Category, "categoryId"),
            FixtureKind::Sale => (FixtureKind::Plant, "plantId"),
        }
    }
}

impl fmt::Display for FixtureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership link from a child fixture to the fixture it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentLink {
    pub kind: FixtureKind,
    pub server_id: i64,
    pub display_name: String,
}

/// A test-created backend entity
#[derive(Debug, Clone, Serialize)]
pub struct Fixture {
    kind: FixtureKind,
    server_id: Option<i64>,
    display_name: String,
    creation_request: Value,
    parent: Option<ParentLink>,
}

impl Fixture {
    /// A fixture whose creation has not succeeded; deleting it is a no-op
    pub fn pending(
        kind: FixtureKind,
        display_name: impl Into<String>,
        creation_request: Value,
    ) -> Self {
        Self {
            kind,
            server_id: None,
            display_name: display_name.into(),
            creation_request,
            parent: None,
        }
    }

    /// An entity that already exists on the backend (found by name)
    pub fn existing(kind: FixtureKind, server_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            kind,
            server_id: Some(server_id),
            display_name: display_name.into(),
            creation_request: Value::Null,
            parent: None,
        }
    }

    pub fn kind(&self) -> FixtureKind {
        self.kind
    }

    pub fn server_id(&self) -> Option<i64> {
        self.server_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn creation_request(&self) -> &Value {
        &self.creation_request
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    fn link(&self) -> Option<ParentLink> {
        self.server_id.map(|server_id| ParentLink {
            kind: self.kind,
            server_id,
            display_name: self.display_name.clone(),
        })
    }
}

/// What a best-effort delete actually did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Nothing was ever created, no request issued
    Skipped,
    Deleted,
    /// 404: the scenario already removed it
    AlreadyGone,
    Failed(String),
}

/// Main category → sub-category → plant, in creation order
#[derive(Debug, Clone)]
pub struct CategoryTree {
    pub main_category: Fixture,
    pub sub_category: Fixture,
    pub plant: Fixture,
}

impl CategoryTree {
    /// Child-before-parent deletion order
    pub fn teardown_order(&self) -> [&Fixture; 3] {
        [&self.plant, &self.sub_category, &self.main_category]
    }
}

/// A sale recorded against an existing plant
#[derive(Debug, Clone)]
pub struct SaleFixture {
    pub sale: Fixture,
    /// Plant record as listed before the sale
    pub plant: Value,
}

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Short unique name: `prefix` plus five digits derived from the clock
///
/// Kept short because the application caps category names at 10 characters.
pub fn unique_name(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis().unsigned_abs();
    let seq = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}{:05}", prefix, (millis + seq) % 100_000)
}

/// Creates and removes fixtures through the REST API
#[derive(Debug, Clone)]
pub struct FixtureLifecycleManager {
    api: ApiClient,
    settle_delay: Duration,
}

impl FixtureLifecycleManager {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            settle_delay: Duration::ZERO,
        }
    }

    /// Pause after each successful write before anything reads it back
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Create one entity; exactly one request is issued
    ///
    /// The parent's id is injected as the foreign key: `parentId` in a
    /// category body, the path segment for plants and sales. Plants and sales
    /// may carry `categoryId`/`plantId` in the payload instead of a parent.
    pub async fn create_fixture(
        &self,
        token: &str,
        kind: FixtureKind,
        payload: Value,
        parent: Option<&Fixture>,
    ) -> E2eResult<Fixture> {
        let parent_link = match parent {
            Some(parent) => Some(parent.link().ok_or(E2eError::MissingParent { kind })?),
            None => None,
        };
        let (path, body) = creation_request(kind, &payload, parent_link.as_ref())?;

        let display_name = payload
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| match &parent_link {
                Some(p) => format!("{} of {}", kind, p.display_name),
                None => kind.to_string(),
            });

        let response = self.api.post(&path, Some(token), body.as_ref()).await?;
        if !response.is_success() {
            warn!(
                "Creating {} '{}' failed: {} {}",
                kind,
                display_name,
                response.status,
                response.snippet()
            );
            return Err(E2eError::FixtureCreationFailed {
                kind,
                payload,
                status: response.status,
                body: response.snippet(),
            });
        }

        let server_id = response.id().ok_or_else(|| E2eError::MalformedResponse {
            endpoint: path.clone(),
            reason: format!(
                "status {} without integer id: {}",
                response.status,
                response.snippet()
            ),
        })?;

        info!("Created {} '{}' (id {})", kind, display_name, server_id);
        self.settle().await;

        Ok(Fixture {
            kind,
            server_id: Some(server_id),
            display_name,
            creation_request: body.unwrap_or(payload),
            parent: parent_link,
        })
    }

    /// Best-effort delete with the admin session; never fails
    pub async fn delete_fixture(
        &self,
        sessions: &mut AuthSessionCache,
        fixture: &Fixture,
    ) -> DeleteOutcome {
        let id = match fixture.server_id {
            Some(id) => id,
            None => {
                debug!("Skipping delete of uncreated {} '{}'", fixture.kind, fixture.display_name);
                return DeleteOutcome::Skipped;
            }
        };

        let token = match sessions.admin_token(&self.api).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Cleanup of {} {} skipped, no admin session: {}", fixture.kind, id, e);
                return DeleteOutcome::Failed(e.to_string());
            }
        };

        match self.api.delete(&fixture.kind.item_path(id), Some(&token)).await {
            Ok(response) if response.is_success() => {
                info!("Deleted {} '{}' (id {})", fixture.kind, fixture.display_name, id);
                DeleteOutcome::Deleted
            }
            Ok(response) if response.status == 404 => {
                debug!("{} {} already gone", fixture.kind, id);
                DeleteOutcome::AlreadyGone
            }
            Ok(response) => {
                warn!(
                    "Cleanup of {} {} returned {} {}",
                    fixture.kind,
                    id,
                    response.status,
                    response.snippet()
                );
                DeleteOutcome::Failed(format!("status {}", response.status))
            }
            Err(e) => {
                warn!("Cleanup of {} {} failed: {}", fixture.kind, id, e);
                DeleteOutcome::Failed(e.to_string())
            }
        }
    }

    /// Replace an entity's fields, keeping its identity
    ///
    /// The fixture is only refreshed when the backend accepts the update.
    pub async fn update_fixture(
        &self,
        token: &str,
        fixture: &mut Fixture,
        payload: Value,
    ) -> E2eResult<ApiResponse> {
        let id = fixture.server_id.ok_or_else(|| E2eError::FixtureNotFound {
            kind: fixture.kind,
            name: fixture.display_name.clone(),
        })?;

        let response = self.api.put(&fixture.kind.item_path(id), Some(token), &payload).await?;
        if response.is_success() {
            if let Some(name) = payload.get("name").and_then(Value::as_str) {
                fixture.display_name = name.to_string();
            }
            fixture.creation_request = payload;
            self.settle().await;
        }
        Ok(response)
    }

    /// Id of the first listed entity named `name`, `None` when absent
    ///
    /// Listing failures are logged and reported as not found.
    pub async fn find_existing_by_name(
        &self,
        token: &str,
        kind: FixtureKind,
        name: &str,
        list_endpoint: &str,
    ) -> Option<i64> {
        let response = match self.api.get(list_endpoint, Some(token)).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                warn!("Listing {} returned {}", list_endpoint, response.status);
                return None;
            }
            Err(e) => {
                warn!("Listing {} failed: {}", list_endpoint, e);
                return None;
            }
        };

        let Some(list) = listing::ListResponse::from_value(&response.body) else {
            warn!("Listing {} did not return a list: {}", list_endpoint, response.snippet());
            return None;
        };
        let entries = list.into_entries();
        let id = listing::find_by_name(&entries, name).and_then(listing::entry_id);
        debug!("Lookup {} '{}' -> {:?}", kind, name, id);
        id
    }

    /// Delete any existing entity named `name` before a scenario recreates it
    pub async fn delete_existing_by_name(
        &self,
        sessions: &mut AuthSessionCache,
        kind: FixtureKind,
        name: &str,
    ) -> DeleteOutcome {
        let token = match sessions.admin_token(&self.api).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Pre-cleanup of {} '{}' skipped: {}", kind, name, e);
                return DeleteOutcome::Failed(e.to_string());
            }
        };

        match self
            .find_existing_by_name(&token, kind, name, kind.list_endpoint())
            .await
        {
            Some(id) => {
                info!("Removing leftover {} '{}' (id {})", kind, name, id);
                self.delete_fixture(sessions, &Fixture::existing(kind, id, name))
                    .await
            }
            None => DeleteOutcome::Skipped,
        }
    }

    /// Delete every listed entity of `kind`; returns how many were deleted
    ///
    /// Sub-categories nested in the category listing are deleted before
    /// their parents.
    pub async fn sweep(&self, sessions: &mut AuthSessionCache, kind: FixtureKind) -> usize {
        let token = match sessions.admin_token(&self.api).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Sweep of {} skipped: {}", kind, e);
                return 0;
            }
        };

        let entries = match self.api.get(kind.list_endpoint(), Some(&token)).await {
            Ok(response) if response.is_success() => listing::entries(&response.body),
            Ok(response) => {
                warn!("Sweep listing of {} returned {}", kind, response.status);
                return 0;
            }
            Err(e) => {
                warn!("Sweep listing of {} failed: {}", kind, e);
                return 0;
            }
        };

        let entries = match kind {
            FixtureKind::Category => listing::children_first(&entries),
            _ => entries,
        };

        info!("Sweeping {} {} record(s)", entries.len(), kind);
        let mut deleted = 0;
        for entry in &entries {
            let Some(id) = listing::entry_id(entry) else {
                continue;
            };
            let name = entry.get("name").and_then(Value::as_str).unwrap_or_default();
            if self.delete_fixture(sessions, &Fixture::existing(kind, id, name)).await
                == DeleteOutcome::Deleted
            {
                deleted += 1;
            }
        }
        deleted
    }

    /// Main category, a sub-category under it, and a plant in the sub-category
    ///
    /// Created with the admin session. If a later step fails, the fixtures
    /// already created are removed child-first before the error is returned.
    pub async fn create_category_tree(
        &self,
        sessions: &mut AuthSessionCache,
    ) -> E2eResult<CategoryTree> {
        let token = sessions.admin_token(&self.api).await?;

        let main_category = self
            .create_fixture(
                &token,
                FixtureKind::Category,
                json!({ "name": unique_name("Cat") }),
                None,
            )
            .await?;

        let sub_category = match self
            .create_fixture(
                &token,
                FixtureKind::Category,
                json!({ "name": unique_name("Sub") }),
                Some(&main_category),
            )
            .await
        {
            Ok(sub) => sub,
            Err(e) => {
                self.rollback(sessions, &[&main_category]).await;
                return Err(e);
            }
        };

        let plant = match self
            .create_fixture(
                &token,
                FixtureKind::Plant,
                json!({ "name": unique_name("Plt"), "price": 50, "quantity": 100 }),
                Some(&sub_category),
            )
            .await
        {
            Ok(plant) => plant,
            Err(e) => {
                self.rollback(sessions, &[&sub_category, &main_category]).await;
                return Err(e);
            }
        };

        Ok(CategoryTree {
            main_category,
            sub_category,
            plant,
        })
    }

    async fn rollback(&self, sessions: &mut AuthSessionCache, created: &[&Fixture]) {
        warn!("Rolling back {} partially created fixture(s)", created.len());
        for fixture in created {
            self.delete_fixture(sessions, fixture).await;
        }
    }

    /// Record a one-unit sale against a plant that has stock
    ///
    /// When no listed plant has stock, the first plant is restocked to 10.
    pub async fn ensure_sale(&self, token: &str) -> E2eResult<SaleFixture> {
        let response = self.api.get(FixtureKind::Plant.list_endpoint(), Some(token)).await?;
        if !response.is_success() {
            return Err(E2eError::AssertionFailed(format!(
                "listing plants returned {}: {}",
                response.status,
                response.snippet()
            )));
        }
        let plants = listing::entries(&response.body);

        let in_stock = plants
            .iter()
            .find(|p| p.get("quantity").and_then(Value::as_i64).unwrap_or(0) > 0)
            .cloned();

        let plant = match in_stock {
            Some(plant) => plant,
            None => {
                let first = plants.first().cloned().ok_or(E2eError::FixtureNotFound {
                    kind: FixtureKind::Plant,
                    name: "any plant".to_string(),
                })?;
                self.restock(token, &first, 10).await?
            }
        };

        let plant_id = listing::entry_id(&plant).ok_or_else(|| E2eError::MalformedResponse {
            endpoint: FixtureKind::Plant.list_endpoint().to_string(),
            reason: "plant without integer id".to_string(),
        })?;
        let plant_name = plant.get("name").and_then(Value::as_str).unwrap_or_default();

        let sale = self
            .create_fixture(
                token,
                FixtureKind::Sale,
                json!({ "plantId": plant_id, "quantity": 1 }),
                None,
            )
            .await?;
        let sale = Fixture {
            parent: Some(ParentLink {
                kind: FixtureKind::Plant,
                server_id: plant_id,
                display_name: plant_name.to_string(),
            }),
            ..sale
        };

        Ok(SaleFixture { sale, plant })
    }

    async fn restock(&self, token: &str, plant: &Value, quantity: i64) -> E2eResult<Value> {
        let id = listing::entry_id(plant).ok_or_else(|| E2eError::MalformedResponse {
            endpoint: FixtureKind::Plant.list_endpoint().to_string(),
            reason: "plant without integer id".to_string(),
        })?;
        let category_id = plant
            .get("category")
            .and_then(|c| c.get("id"))
            .or_else(|| plant.get("categoryId"))
            .cloned()
            .unwrap_or(Value::Null);

        info!("No plant has stock, restocking plant {} to {}", id, quantity);
        let body = json!({
            "name": plant.get("name").cloned().unwrap_or(Value::Null),
            "price": plant.get("price").cloned().unwrap_or(Value::Null),
            "quantity": quantity,
            "categoryId": category_id,
        });
        let response = self.api.put(&FixtureKind::Plant.item_path(id), Some(token), &body).await?;
        if !response.is_success() {
            return Err(E2eError::AssertionFailed(format!(
                "restocking plant {} returned {}: {}",
                id,
                response.status,
                response.snippet()
            )));
        }
        self.settle().await;

        let mut restocked = plant.clone();
        if let Some(obj) = restocked.as_object_mut() {
            obj.insert("quantity".to_string(), json!(quantity));
        }
        Ok(restocked)
    }

    async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }
}

/// Path and body of the creation call for `kind`
fn creation_request(
    kind: FixtureKind,
    payload: &Value,
    parent: Option<&ParentLink>,
) -> E2eResult<(String, Option<Value>)> {
    let (parent_kind, fk_field) = kind.parent_rule();

    if let Some(parent) = parent {
        if parent.kind != parent_kind {
            return Err(E2eError::Config(format!(
                "a {} cannot belong to a {}",
                kind, parent.kind
            )));
        }
    }

    let foreign_key = parent
        .map(|p| p.server_id)
        .or_else(|| payload.get(fk_field).and_then(Value::as_i64));

    match kind {
        FixtureKind::Category => {
            let mut body: Map<String, Value> = payload.as_object().cloned().unwrap_or_default();
            body.insert(
                fk_field.to_string(),
                foreign_key.map(Value::from).unwrap_or(Value::Null),
            );
            Ok(("/api/categories".to_string(), Some(Value::Object(body))))
        }
        FixtureKind::Plant => {
            let category_id = foreign_key.ok_or(E2eError::MissingParent { kind })?;
            let mut body: Map<String, Value> = payload.as_object().cloned().unwrap_or_default();
            body.remove(fk_field);
            Ok((
                format!("/api/plants/category/{}", category_id),
                Some(Value::Object(body)),
            ))
        }
        FixtureKind::Sale => {
            let plant_id = foreign_key.ok_or(E2eError::MissingParent { kind })?;
            let quantity = payload.get("quantity").and_then(Value::as_i64).unwrap_or(1);
            Ok((
                format!("/api/sales/plant/{}?quantity={}", plant_id, quantity),
                None,
            ))
        }
    }
}
