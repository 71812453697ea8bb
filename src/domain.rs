//! Core entity types shared by the storage contract, the entity assembler,
//! the branch copier, and the merge engine.
//!
//! Cross-branch `source_sheet_id` / `source_column_id` pointers are plain
//! `Option<Uuid>` lookup keys, never ownership edges — a sheet or column does
//! not borrow or own the entity it was copied from, and the pointer may
//! dangle once the source branch is retired.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permission a user holds on a project. Lower weight is stronger: an owner
/// (0) may grant any permission; a contributor (1) may not grant permissions
/// stronger than their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
	Owner,
	Contributor,
}

impl Permission {
	pub fn weight(self) -> i32 {
		match self {
			Permission::Owner => 0,
			Permission::Contributor => 1,
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"owner" => Some(Permission::Owner),
			"contributor" => Some(Permission::Contributor),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Permission::Owner => "owner",
			Permission::Contributor => "contributor",
		}
	}

	/// True iff granting `target` is within what a holder of `self` may assign.
	/// A grantor cannot assign a permission stronger than their own.
	pub fn can_grant(self, target: Permission) -> bool {
		self.weight() <= target.weight()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
	pub id: Uuid,
	pub email: String,
	#[serde(skip_serializing)]
	pub password_hash: String,
	pub opened_sheet: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
	pub id: Uuid,
	pub name: String,
	pub game_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTable {
	pub user_id: Uuid,
	pub table_id: Uuid,
	pub permission: Permission,
}

/// An opaque, long-lived refresh token issued alongside an access token at
/// login (spec §6, "out of scope" collaborator carried for completeness).
/// `revoked_at` is set by the revoke endpoint rather than deleting the row,
/// so a reused revoked token can be reported distinctly from an unknown one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
	pub token: String,
	pub user_id: Uuid,
	pub expires_at: DateTime<Utc>,
	pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
	pub id: Uuid,
	pub name: String,
	pub is_protected: bool,
	pub table_id: Uuid,
	pub created_at: DateTime<Utc>,
}

/// Sheet shape. `Enums` sheets are read by the assembler to populate UI
/// dropdowns and are never exported via the JSON export path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetType {
	List,
	Map,
	Enums,
}

impl SheetType {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"list" => Some(SheetType::List),
			"map" => Some(SheetType::Map),
			"enums" => Some(SheetType::Enums),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			SheetType::List => "list",
			SheetType::Map => "map",
			SheetType::Enums => "enums",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
	pub id: Uuid,
	pub name: String,
	#[serde(rename = "type")]
	pub sheet_type: SheetType,
	pub branch_id: Uuid,
	pub source_sheet_id: Option<Uuid>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
	pub id: Uuid,
	pub name: String,
	#[serde(rename = "type")]
	pub column_type: String,
	pub required: bool,
	pub sheet_id: Uuid,
	pub source_column_id: Option<Uuid>,
	pub order_index: i32,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnData {
	pub id: Uuid,
	pub idx: i64,
	pub value: Option<String>,
	pub cell_type: Option<String>,
	pub column_id: Uuid,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// One flat row of the denormalised `get_branch_data_for_merge` scan (§4.1).
/// A branch with empty sheets/columns still yields rows because the query
/// behind this type LEFT-JOINs sheet → column → cell; absent legs are `None`.
#[derive(Debug, Clone)]
pub struct BranchMergeRow {
	pub sheet_id: Uuid,
	pub sheet_name: String,
	pub sheet_type: SheetType,
	pub sheet_updated_at: DateTime<Utc>,
	pub source_sheet_id: Option<Uuid>,

	pub column_id: Option<Uuid>,
	pub column_name: Option<String>,
	pub column_type: Option<String>,
	pub column_required: Option<bool>,
	pub column_updated_at: Option<DateTime<Utc>>,
	pub source_column_id: Option<Uuid>,

	pub cell_id: Option<Uuid>,
	pub cell_idx: Option<i64>,
	pub cell_value: Option<String>,
	pub cell_created_at: Option<DateTime<Utc>>,
	pub cell_updated_at: Option<DateTime<Utc>>,
}

/// A typed value produced by the entity assembler's typed-value parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
	Text(String),
	Number(f64),
	Integer(i64),
	Bool(bool),
	Array(Vec<String>),
	Null,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enum {
	pub name: String,
	pub sheet_id: Uuid,
	pub values: Vec<String>,
}
