use crate::error::{AuthzError, GrantField, GrantValidationError};
use serde::{Deserialize, Serialize};

/// The four actions a grant can authorize. Closed set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionKind {
    Read,
    Write,
    Create,
    Delete,
}

impl PermissionKind {
    pub const ALL: [PermissionKind; 4] = [
        PermissionKind::Read,
        PermissionKind::Write,
        PermissionKind::Create,
        PermissionKind::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionKind::Read => "READ",
            PermissionKind::Write => "WRITE",
            PermissionKind::Create => "CREATE",
            PermissionKind::Delete => "DELETE",
        }
    }

    /// Kinds that count as "write access" for navigation gating.
    pub fn is_mutating(self) -> bool {
        !matches!(self, PermissionKind::Read)
    }
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Table,
    View,
}

/// A named table or view inside a schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub name: String,
    pub kind: ObjectKind,
}

impl ObjectRef {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Table,
        }
    }

    pub fn view(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::View,
        }
    }
}

/// Breadth at which a grant applies.
///
/// Semantics, most general first:
/// - `Global` applies to every schema and every object in it.
/// - `Schema` applies to the schema itself and every table or view inside it.
/// - `Table` / `View` apply to exactly one object and never to the schema that
///   holds it. A table grant never applies to a view of the same name.
///
/// Name comparisons are exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Global,
    Schema(String),
    Table { schema: String, table: String },
    View { schema: String, view: String },
}

impl Scope {
    pub fn schema_name(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Schema(schema)
            | Scope::Table { schema, .. }
            | Scope::View { schema, .. } => Some(schema),
        }
    }

    /// Whether a grant at this scope answers `target`. Only scopes equal to or
    /// broader than the target qualify.
    pub fn covers(&self, target: &RequestedTarget) -> bool {
        match (self, target) {
            (Scope::Global, _) => true,
            (Scope::Schema(s), RequestedTarget::Schema(t)) => s == t,
            (Scope::Schema(s), RequestedTarget::Object { schema, .. }) => s == schema,
            (
                Scope::Table { schema: s, table },
                RequestedTarget::Object { schema, object },
            ) => s == schema && object.kind == ObjectKind::Table && &object.name == table,
            (Scope::View { schema: s, view }, RequestedTarget::Object { schema, object }) => {
                s == schema && object.kind == ObjectKind::View && &object.name == view
            }
            _ => false,
        }
    }

    /// Whether this scope lies at or below `target`, e.g. a table grant inside
    /// a requested schema.
    pub fn within(&self, target: &RequestedTarget) -> bool {
        match target {
            RequestedTarget::Global => true,
            RequestedTarget::Schema(t) => self.schema_name() == Some(t.as_str()),
            RequestedTarget::Object { .. } => !matches!(self, Scope::Global | Scope::Schema(_))
                && self.covers(target),
        }
    }

    /// Covers the target or sits underneath it.
    pub fn relevant_to(&self, target: &RequestedTarget) -> bool {
        self.covers(target) || self.within(target)
    }

    /// Whether every target this scope answers is also answered by `self`.
    pub fn contains(&self, other: &Scope) -> bool {
        match (self, other) {
            (Scope::Global, _) => true,
            (Scope::Schema(s), other) => other.schema_name() == Some(s.as_str()),
            (a, b) => a == b,
        }
    }
}

/// Wire form of a grant with nullable scope fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GrantRecord {
    #[serde(alias = "permission")]
    pub kind: PermissionKind,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub view: Option<String>,
}

impl GrantRecord {
    pub fn new(kind: PermissionKind) -> Self {
        Self {
            kind,
            schema: None,
            table: None,
            view: None,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn validate(self) -> Result<PermissionGrant, GrantValidationError> {
        PermissionGrant::try_from(self)
    }
}

/// One atomic rule: a permission kind at a scope. Equality is the tuple
/// `(kind, schema, table, view)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "GrantRecord", into = "GrantRecord")]
pub struct PermissionGrant {
    pub kind: PermissionKind,
    pub scope: Scope,
}

impl PermissionGrant {
    pub fn new(kind: PermissionKind, scope: Scope) -> Self {
        Self { kind, scope }
    }

    pub fn global(kind: PermissionKind) -> Self {
        Self::new(kind, Scope::Global)
    }

    pub fn schema(kind: PermissionKind, schema: impl Into<String>) -> Self {
        Self::new(kind, Scope::Schema(schema.into()))
    }

    pub fn table(
        kind: PermissionKind,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self::new(
            kind,
            Scope::Table {
                schema: schema.into(),
                table: table.into(),
            },
        )
    }

    pub fn view(kind: PermissionKind, schema: impl Into<String>, view: impl Into<String>) -> Self {
        Self::new(
            kind,
            Scope::View {
                schema: schema.into(),
                view: view.into(),
            },
        )
    }

    pub fn matches(&self, target: &RequestedTarget) -> bool {
        self.scope.covers(target)
    }
}

fn non_empty(
    value: Option<String>,
    field: GrantField,
) -> Result<Option<String>, GrantValidationError> {
    match value {
        Some(name) if name.is_empty() => Err(GrantValidationError::EmptyName { field }),
        other => Ok(other),
    }
}

impl TryFrom<GrantRecord> for PermissionGrant {
    type Error = GrantValidationError;

    fn try_from(record: GrantRecord) -> Result<Self, Self::Error> {
        let schema = non_empty(record.schema, GrantField::Schema)?;
        let table = non_empty(record.table, GrantField::Table)?;
        let view = non_empty(record.view, GrantField::View)?;
        let scope = match (schema, table, view) {
            (_, Some(table), Some(view)) => {
                return Err(GrantValidationError::TableAndView { table, view });
            }
            (None, Some(name), None) => {
                return Err(GrantValidationError::ObjectWithoutSchema {
                    field: GrantField::Table,
                    name,
                });
            }
            (None, None, Some(name)) => {
                return Err(GrantValidationError::ObjectWithoutSchema {
                    field: GrantField::View,
                    name,
                });
            }
            (None, None, None) => Scope::Global,
            (Some(schema), None, None) => Scope::Schema(schema),
            (Some(schema), Some(table), None) => Scope::Table { schema, table },
            (Some(schema), None, Some(view)) => Scope::View { schema, view },
        };
        Ok(PermissionGrant {
            kind: record.kind,
            scope,
        })
    }
}

impl From<PermissionGrant> for GrantRecord {
    fn from(grant: PermissionGrant) -> Self {
        let record = GrantRecord::new(grant.kind);
        match grant.scope {
            Scope::Global => record,
            Scope::Schema(schema) => record.schema(schema),
            Scope::Table { schema, table } => record.schema(schema).table(table),
            Scope::View { schema, view } => record.schema(schema).view(view),
        }
    }
}

/// The authorization question being asked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "TargetRecord", into = "TargetRecord")]
pub enum RequestedTarget {
    Global,
    Schema(String),
    Object { schema: String, object: ObjectRef },
}

impl RequestedTarget {
    pub fn global() -> Self {
        RequestedTarget::Global
    }

    pub fn schema(schema: impl Into<String>) -> Self {
        RequestedTarget::Schema(schema.into())
    }

    pub fn table(schema: impl Into<String>, table: impl Into<String>) -> Self {
        RequestedTarget::Object {
            schema: schema.into(),
            object: ObjectRef::table(table),
        }
    }

    pub fn view(schema: impl Into<String>, view: impl Into<String>) -> Self {
        RequestedTarget::Object {
            schema: schema.into(),
            object: ObjectRef::view(view),
        }
    }

    /// Builds a target from optional route parameters.
    pub fn from_parts(
        schema: Option<String>,
        object: Option<ObjectRef>,
    ) -> Result<Self, AuthzError> {
        match (schema, object) {
            (None, None) => Ok(RequestedTarget::Global),
            (Some(schema), None) => Ok(RequestedTarget::Schema(schema)),
            (Some(schema), Some(object)) => Ok(RequestedTarget::Object { schema, object }),
            (None, Some(object)) => Err(AuthzError::InvalidTarget {
                message: format!("object '{}' requested without a schema", object.name),
            }),
        }
    }

    pub fn schema_name(&self) -> Option<&str> {
        match self {
            RequestedTarget::Global => None,
            RequestedTarget::Schema(schema) | RequestedTarget::Object { schema, .. } => {
                Some(schema)
            }
        }
    }

    pub fn object(&self) -> Option<&ObjectRef> {
        match self {
            RequestedTarget::Object { object, .. } => Some(object),
            _ => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, RequestedTarget::Global)
    }

    pub fn cache_key(&self) -> TargetKey {
        TargetKey::from(self)
    }
}

/// Wire and route-parameter form of a target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
}

impl TryFrom<TargetRecord> for RequestedTarget {
    type Error = AuthzError;

    fn try_from(record: TargetRecord) -> Result<Self, Self::Error> {
        let object = match (record.table, record.view) {
            (Some(table), Some(view)) => {
                return Err(AuthzError::InvalidTarget {
                    message: format!("target names both table '{table}' and view '{view}'"),
                });
            }
            (Some(table), None) => Some(ObjectRef::table(table)),
            (None, Some(view)) => Some(ObjectRef::view(view)),
            (None, None) => None,
        };
        RequestedTarget::from_parts(record.schema, object)
    }
}

impl From<RequestedTarget> for TargetRecord {
    fn from(target: RequestedTarget) -> Self {
        TargetKey::from(&target).into()
    }
}

/// Cache identity of a target: the `(schema, table, view)` triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetKey {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub view: Option<String>,
}

impl From<&RequestedTarget> for TargetKey {
    fn from(target: &RequestedTarget) -> Self {
        let schema = target.schema_name().map(str::to_string);
        let (table, view) = match target.object() {
            Some(ObjectRef {
                name,
                kind: ObjectKind::Table,
            }) => (Some(name.clone()), None),
            Some(ObjectRef {
                name,
                kind: ObjectKind::View,
            }) => (None, Some(name.clone())),
            None => (None, None),
        };
        TargetKey {
            schema,
            table,
            view,
        }
    }
}

impl From<TargetKey> for TargetRecord {
    fn from(key: TargetKey) -> Self {
        TargetRecord {
            schema: key.schema,
            table: key.table,
            view: key.view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        GrantRecord, ObjectRef, PermissionGrant, PermissionKind, RequestedTarget, Scope,
        TargetRecord,
    };
    use crate::error::GrantValidationError;

    fn all_shapes() -> Vec<RequestedTarget> {
        vec![
            RequestedTarget::global(),
            RequestedTarget::schema("sales"),
            RequestedTarget::schema("hr"),
            RequestedTarget::table("sales", "orders"),
            RequestedTarget::view("hr", "headcount"),
        ]
    }

    #[test]
    fn global_grant_covers_every_target_shape() {
        let grant = PermissionGrant::global(PermissionKind::Read);
        for target in all_shapes() {
            assert!(grant.matches(&target), "global grant should cover {target:?}");
        }
    }

    #[test]
    fn schema_grant_covers_schema_and_its_objects_only() {
        let scope = Scope::Schema("s".into());
        assert!(scope.covers(&RequestedTarget::schema("s")));
        assert!(scope.covers(&RequestedTarget::table("s", "orders")));
        assert!(scope.covers(&RequestedTarget::view("s", "anything")));
        assert!(!scope.covers(&RequestedTarget::table("other", "orders")));
        assert!(!scope.covers(&RequestedTarget::global()));
    }

    #[test]
    fn object_grants_do_not_answer_broader_questions() {
        let table = PermissionGrant::table(PermissionKind::Delete, "s", "orders");
        assert!(table.matches(&RequestedTarget::table("s", "orders")));
        assert!(!table.matches(&RequestedTarget::schema("s")));
        assert!(!table.matches(&RequestedTarget::global()));
        assert!(!table.matches(&RequestedTarget::table("s", "customers")));
    }

    #[test]
    fn table_and_view_grants_are_disjoint() {
        let table = Scope::Table {
            schema: "s".into(),
            table: "t".into(),
        };
        let view = Scope::View {
            schema: "s".into(),
            view: "t".into(),
        };
        assert!(!table.covers(&RequestedTarget::view("s", "t")));
        assert!(!view.covers(&RequestedTarget::table("s", "t")));
        assert!(view.covers(&RequestedTarget::view("s", "t")));
    }

    #[test]
    fn names_compare_case_sensitively() {
        let scope = Scope::Schema("Sales".into());
        assert!(!scope.covers(&RequestedTarget::schema("sales")));
    }

    #[test]
    fn within_tracks_grants_below_the_target() {
        let table = Scope::Table {
            schema: "s".into(),
            table: "t".into(),
        };
        assert!(table.within(&RequestedTarget::global()));
        assert!(table.within(&RequestedTarget::schema("s")));
        assert!(!table.within(&RequestedTarget::schema("x")));
        assert!(table.within(&RequestedTarget::table("s", "t")));
        assert!(!Scope::Global.within(&RequestedTarget::schema("s")));
        assert!(Scope::Global.relevant_to(&RequestedTarget::schema("s")));
        assert!(table.relevant_to(&RequestedTarget::schema("s")));
    }

    #[test]
    fn containment_follows_breadth() {
        let schema = Scope::Schema("s".into());
        let table = Scope::Table {
            schema: "s".into(),
            table: "t".into(),
        };
        assert!(Scope::Global.contains(&schema));
        assert!(schema.contains(&table));
        assert!(!table.contains(&schema));
        assert!(!Scope::Schema("x".into()).contains(&table));
    }

    #[test]
    fn malformed_records_are_rejected() {
        let err = GrantRecord::new(PermissionKind::Read)
            .table("x")
            .validate()
            .expect_err("object without schema");
        assert!(matches!(err, GrantValidationError::ObjectWithoutSchema { .. }));

        let err = GrantRecord::new(PermissionKind::Read)
            .schema("s")
            .table("t")
            .view("v")
            .validate()
            .expect_err("table and view");
        assert!(matches!(err, GrantValidationError::TableAndView { .. }));

        let err = GrantRecord::new(PermissionKind::Write)
            .schema("")
            .validate()
            .expect_err("empty schema");
        assert!(matches!(err, GrantValidationError::EmptyName { .. }));
    }

    #[test]
    fn grants_deserialize_through_validation() {
        let grant: PermissionGrant =
            serde_json::from_str(r#"{"kind":"WRITE","schema":"sales","table":"orders"}"#)
                .expect("valid grant");
        assert_eq!(grant, PermissionGrant::table(PermissionKind::Write, "sales", "orders"));

        let legacy: PermissionGrant =
            serde_json::from_str(r#"{"permission":"READ","schema":null,"table":null,"view":null}"#)
                .expect("legacy field name");
        assert_eq!(legacy, PermissionGrant::global(PermissionKind::Read));

        let bad = serde_json::from_str::<PermissionGrant>(r#"{"kind":"READ","view":"v"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn targets_reject_objects_without_schema() {
        assert!(RequestedTarget::from_parts(None, Some(ObjectRef::table("t"))).is_err());
        let record = TargetRecord {
            schema: Some("s".into()),
            table: Some("t".into()),
            view: Some("v".into()),
        };
        assert!(RequestedTarget::try_from(record).is_err());
    }

    #[test]
    fn equal_triples_share_a_cache_key() {
        let a = RequestedTarget::table("sales", "orders");
        let b = RequestedTarget::from_parts(Some("sales".into()), Some(ObjectRef::table("orders")))
            .expect("target");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(
            RequestedTarget::table("sales", "orders").cache_key(),
            RequestedTarget::view("sales", "orders").cache_key()
        );
        assert_ne!(
            RequestedTarget::global().cache_key(),
            RequestedTarget::schema("sales").cache_key()
        );
    }
}
