use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::RegistryError;

/// The kinds of soft-deletable records kept in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Citizen,
    Household,
    Business,
    Infrastructure,
    Sitio,
    PermissionGrant,
}

impl EntityKind {
    /// Every kind, in registry order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Citizen,
        EntityKind::Household,
        EntityKind::Business,
        EntityKind::Infrastructure,
        EntityKind::Sitio,
        EntityKind::PermissionGrant,
    ];

    /// Returns the stable snake_case name used in storage and on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Citizen => "citizen",
            EntityKind::Household => "household",
            EntityKind::Business => "business",
            EntityKind::Infrastructure => "infrastructure",
            EntityKind::Sitio => "sitio",
            EntityKind::PermissionGrant => "permission_grant",
        }
    }

    /// Returns the type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            EntityKind::Citizen => "Citizen",
            EntityKind::Household => "Household",
            EntityKind::Business => "Business",
            EntityKind::Infrastructure => "Infrastructure",
            EntityKind::Sitio => "Sitio",
            EntityKind::PermissionGrant => "PermissionGrant",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RegistryError::UnknownKind(s.to_string()))
    }
}

/// Bookkeeping shared by every soft-deletable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: Uuid,
    pub is_deleted: bool,
    /// Present only while `is_deleted` is true.
    pub delete_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordMeta {
    /// Creates live metadata with a fresh ID and both timestamps set to now.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            is_deleted: false,
            delete_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advances `updated_at` without ever moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
    }

    /// Flags the record as archived with the given reason.
    pub fn mark_deleted(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.is_deleted = true;
        self.delete_reason = Some(reason.into());
        self.touch(now);
    }

    /// Brings an archived record back and clears its reason.
    pub fn mark_restored(&mut self, now: DateTime<Utc>) {
        self.is_deleted = false;
        self.delete_reason = None;
        self.touch(now);
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citizen {
    pub meta: RecordMeta,
    pub first_name: String,
    pub last_name: String,
    pub household_id: Option<Uuid>,
    /// When the record was encoded by staff; drives "latest citizens".
    pub date_encoded: DateTime<Utc>,
}

impl Citizen {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        let meta = RecordMeta::new();
        Self {
            date_encoded: meta.created_at,
            meta,
            first_name: first_name.into(),
            last_name: last_name.into(),
            household_id: None,
        }
    }

    pub fn with_household(mut self, household_id: Uuid) -> Self {
        self.household_id = Some(household_id);
        self
    }

    pub fn with_date_encoded(mut self, date_encoded: DateTime<Utc>) -> Self {
        self.date_encoded = date_encoded;
        self
    }

    /// Sets a specific ID for this citizen (useful for testing).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.meta.id = id;
        self
    }

    /// Returns "First Last".
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A household, located in a sitio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Household {
    pub meta: RecordMeta,
    pub household_number: String,
    pub sitio_id: Uuid,
}

impl Household {
    pub fn new(household_number: impl Into<String>, sitio_id: Uuid) -> Self {
        Self {
            meta: RecordMeta::new(),
            household_number: household_number.into(),
            sitio_id,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.meta.id = id;
        self
    }
}

/// A registered business establishment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Business {
    pub meta: RecordMeta,
    pub name: String,
    pub owner_name: String,
    /// Account that encoded the record.
    pub encoded_by: Uuid,
    /// Account that last updated the record.
    pub updated_by: Option<Uuid>,
}

impl Business {
    pub fn new(name: impl Into<String>, owner_name: impl Into<String>, encoded_by: Uuid) -> Self {
        Self {
            meta: RecordMeta::new(),
            name: name.into(),
            owner_name: owner_name.into(),
            encoded_by,
            updated_by: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.meta.id = id;
        self
    }
}

/// A public infrastructure item (road, building, water system, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infrastructure {
    pub meta: RecordMeta,
    pub name: String,
    pub category: String,
}

impl Infrastructure {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            name: name.into(),
            category: category.into(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.meta.id = id;
        self
    }
}

/// A sub-village unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sitio {
    pub meta: RecordMeta,
    pub name: String,
}

impl Sitio {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            name: name.into(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.meta.id = id;
        self
    }
}

/// A named system permission granted to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub meta: RecordMeta,
    pub account_id: Uuid,
    pub permission: PermissionName,
}

impl PermissionGrant {
    pub fn new(account_id: Uuid, permission: PermissionName) -> Self {
        Self {
            meta: RecordMeta::new(),
            account_id,
            permission,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.meta.id = id;
        self
    }
}

/// Any record held by the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Citizen(Citizen),
    Household(Household),
    Business(Business),
    Infrastructure(Infrastructure),
    Sitio(Sitio),
    PermissionGrant(PermissionGrant),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Citizen(_) => EntityKind::Citizen,
            Entity::Household(_) => EntityKind::Household,
            Entity::Business(_) => EntityKind::Business,
            Entity::Infrastructure(_) => EntityKind::Infrastructure,
            Entity::Sitio(_) => EntityKind::Sitio,
            Entity::PermissionGrant(_) => EntityKind::PermissionGrant,
        }
    }

    pub fn meta(&self) -> &RecordMeta {
        match self {
            Entity::Citizen(e) => &e.meta,
            Entity::Household(e) => &e.meta,
            Entity::Business(e) => &e.meta,
            Entity::Infrastructure(e) => &e.meta,
            Entity::Sitio(e) => &e.meta,
            Entity::PermissionGrant(e) => &e.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut RecordMeta {
        match self {
            Entity::Citizen(e) => &mut e.meta,
            Entity::Household(e) => &mut e.meta,
            Entity::Business(e) => &mut e.meta,
            Entity::Infrastructure(e) => &mut e.meta,
            Entity::Sitio(e) => &mut e.meta,
            Entity::PermissionGrant(e) => &mut e.meta,
        }
    }

    pub fn id(&self) -> Uuid {
        self.meta().id
    }

    pub fn is_deleted(&self) -> bool {
        self.meta().is_deleted
    }

    /// Accounts whose cached access data depends on this record.
    pub fn affected_accounts(&self) -> Vec<Uuid> {
        match self {
            Entity::PermissionGrant(grant) => vec![grant.account_id],
            _ => Vec::new(),
        }
    }

    pub fn as_citizen(&self) -> Option<&Citizen> {
        match self {
            Entity::Citizen(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_household(&self) -> Option<&Household> {
        match self {
            Entity::Household(h) => Some(h),
            _ => None,
        }
    }

    /// Unwraps the record as `T`, or `None` if it is another kind.
    pub fn downcast<T: Record>(self) -> Option<T> {
        T::from_entity(self)
    }
}

/// A concrete record type stored as one [`Entity`] variant.
pub trait Record: Into<Entity> + Sized {
    const KIND: EntityKind;

    fn from_entity(entity: Entity) -> Option<Self>;
}

impl From<Citizen> for Entity {
    fn from(value: Citizen) -> Self {
        Entity::Citizen(value)
    }
}

impl Record for Citizen {
    const KIND: EntityKind = EntityKind::Citizen;

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Citizen(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Household> for Entity {
    fn from(value: Household) -> Self {
        Entity::Household(value)
    }
}

impl Record for Household {
    const KIND: EntityKind = EntityKind::Household;

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Household(h) => Some(h),
            _ => None,
        }
    }
}

impl From<Business> for Entity {
    fn from(value: Business) -> Self {
        Entity::Business(value)
    }
}

impl Record for Business {
    const KIND: EntityKind = EntityKind::Business;

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Business(b) => Some(b),
            _ => None,
        }
    }
}

impl From<Infrastructure> for Entity {
    fn from(value: Infrastructure) -> Self {
        Entity::Infrastructure(value)
    }
}

impl Record for Infrastructure {
    const KIND: EntityKind = EntityKind::Infrastructure;

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Infrastructure(i) => Some(i),
            _ => None,
        }
    }
}

impl From<Sitio> for Entity {
    fn from(value: Sitio) -> Self {
        Entity::Sitio(value)
    }
}

impl Record for Sitio {
    const KIND: EntityKind = EntityKind::Sitio;

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Sitio(s) => Some(s),
            _ => None,
        }
    }
}

impl From<PermissionGrant> for Entity {
    fn from(value: PermissionGrant) -> Self {
        Entity::PermissionGrant(value)
    }
}

impl Record for PermissionGrant {
    const KIND: EntityKind = EntityKind::PermissionGrant;

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::PermissionGrant(g) => Some(g),
            _ => None,
        }
    }
}

/// Account role within the municipal system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Encoder,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Encoder => "encoder",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "encoder" => Ok(Role::Encoder),
            "viewer" => Ok(Role::Viewer),
            other => Err(RegistryError::UnknownRole(other.to_string())),
        }
    }
}

/// A staff account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            role,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}

/// A validated permission token such as `citizens.edit`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionName(String);

impl PermissionName {
    /// Parses a permission name: non-empty, lowercase ASCII letters, digits, `_`, `.` or `-`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapro_core::registry::PermissionName;
    ///
    /// assert!(PermissionName::parse("citizens.edit").is_ok());
    /// assert!(PermissionName::parse("Citizens Edit").is_err());
    /// ```
    pub fn parse(value: impl Into<String>) -> Result<Self, RegistryError> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= 64
            && value.chars().all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-')
            });
        if valid {
            Ok(Self(value))
        } else {
            Err(RegistryError::InvalidPermission(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PermissionName {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PermissionName> for String {
    fn from(value: PermissionName) -> Self {
        value.0
    }
}

/// Counts and recent activity shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub citizens: u64,
    pub households: u64,
    pub businesses: u64,
    pub infrastructures: u64,
    pub latest_citizens: Vec<Citizen>,
}
