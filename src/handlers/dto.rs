//! View DTOs assembled for the CRUD handlers — the "switched-to" views the
//! original returns after creating or opening a branch/project. Grounded on
//! `examples/original_source/backend/{get_branch,get_sheet,get_columns}.go`.

use serde::Serialize;
use uuid::Uuid;

use crate::assembler::{extract_enum, order_cells, parse_typed_value};
use crate::domain::{Enum, SheetType, TypedValue};
use crate::error::AppResult;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct IdName {
	pub id: Uuid,
	pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumDto {
	pub name: String,
	pub sheet_id: Uuid,
	pub values: Vec<String>,
}

impl From<Enum> for EnumDto {
	fn from(e: Enum) -> Self {
		EnumDto {
			name: e.name,
			sheet_id: e.sheet_id,
			values: e.values,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchDto {
	pub id: Uuid,
	pub name: String,
	pub is_protected: bool,
	pub enums: Vec<EnumDto>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnDto {
	pub id: Uuid,
	pub name: String,
	#[serde(rename = "type")]
	pub column_type: String,
	pub required: bool,
	pub data: Vec<TypedValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetDetailDto {
	pub id: Uuid,
	pub name: String,
	#[serde(rename = "type")]
	pub sheet_type: SheetType,
	pub columns: Vec<ColumnDto>,
	pub branch_id_name: IdName,
	pub sheets_id_names: Vec<IdName>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectDto {
	pub id: Uuid,
	pub name: String,
	pub game_url: Option<String>,
	pub branches: Vec<IdName>,
}

/// Every `enums`-type sheet in a branch, reduced to its first column's
/// distinct values. Grounded on `getEnumsForBranch` in `get_branch.go`.
pub async fn enums_for_branch(store: &dyn Store, branch_id: Uuid) -> AppResult<Vec<EnumDto>> {
	let sheets = store.list_sheets_for_branch(branch_id).await?;
	let mut enums = Vec::new();
	for sheet in sheets.iter().filter(|s| s.sheet_type == SheetType::Enums) {
		let columns = store.get_columns_with_data_by_sheet(sheet.id).await?;
		if let Some(e) = extract_enum(sheet, &columns) {
			enums.push(e.into());
		}
	}
	Ok(enums)
}

pub async fn branch_dto(store: &dyn Store, branch_id: Uuid) -> AppResult<Option<BranchDto>> {
	let Some(branch) = store.get_branch(branch_id).await? else {
		return Ok(None);
	};
	let enums = enums_for_branch(store, branch_id).await?;
	Ok(Some(BranchDto {
		id: branch.id,
		name: branch.name,
		is_protected: branch.is_protected,
		enums,
	}))
}

/// The full sheet view: its columns with ordered cell data, its branch's
/// id/name, and the id/name of every sibling sheet in that branch. Grounded
/// on `GetSheet`/`GetColumns` in `get_sheet.go`/`get_columns.go`.
pub async fn sheet_detail_dto(store: &dyn Store, sheet_id: Uuid) -> AppResult<Option<SheetDetailDto>> {
	let Some(sheet) = store.get_sheet(sheet_id).await? else {
		return Ok(None);
	};
	let Some(branch) = store.get_branch(sheet.branch_id).await? else {
		return Ok(None);
	};
	let siblings = store.list_sheets_for_branch(sheet.branch_id).await?;
	let sheets_id_names = siblings.iter().map(|s| IdName { id: s.id, name: s.name.clone() }).collect();

	let columns = store.get_columns_with_data_by_sheet(sheet_id).await?;
	let mut column_dtos = Vec::with_capacity(columns.len());
	for (column, cells) in columns {
		let ordered = order_cells(cells);
		let mut values = Vec::with_capacity(ordered.len());
		for cell in &ordered {
			values.push(parse_typed_value(cell.value.as_deref(), &column.column_type)?);
		}
		column_dtos.push(ColumnDto {
			id: column.id,
			name: column.name,
			column_type: column.column_type,
			required: column.required,
			data: values,
		});
	}

	Ok(Some(SheetDetailDto {
		id: sheet.id,
		name: sheet.name,
		sheet_type: sheet.sheet_type,
		columns: column_dtos,
		branch_id_name: IdName { id: branch.id, name: branch.name },
		sheets_id_names,
	}))
}

pub async fn project_dto(store: &dyn Store, table_id: Uuid) -> AppResult<Option<ProjectDto>> {
	let Some(project) = store.get_project(table_id).await? else {
		return Ok(None);
	};
	let branches = store.list_branches_for_table(table_id).await?;
	Ok(Some(ProjectDto {
		id: project.id,
		name: project.name,
		game_url: project.game_url,
		branches: branches.into_iter().map(|b| IdName { id: b.id, name: b.name }).collect(),
	}))
}
