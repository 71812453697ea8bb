use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
	CellData,
	ColumnProperty,
	SheetProperty,
}

/// One detected three-way conflict. Shape mirrors spec §6's `MergeConflict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConflict {
	pub id: String,
	#[serde(rename = "type")]
	pub conflict_type: ConflictType,
	pub sheet_id: Uuid,
	pub sheet_name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub column_id: Option<Uuid>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub column_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub row_index: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub property: Option<String>,
	pub source_value: String,
	pub target_value: String,
	pub source_updated_at: DateTime<Utc>,
	pub target_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChosenSource {
	Source,
	Target,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeResolution {
	pub conflict_id: String,
	pub chosen_source: ChosenSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergePreviewResponse {
	pub conflicts: Vec<MergeConflict>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeExecuteResponse {
	pub success: bool,
	pub message: String,
	pub target_branch_id: Uuid,
}
