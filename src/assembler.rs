//! Entity assembler: builds Project/Branch/Sheet view objects from the
//! storage contract for the non-core CRUD handlers. Grounded on
//! `examples/original_source/backend/get_sheet.go`, `get_columns.go`, and
//! `get_json.go`.

use serde_json::{Map as JsonMap, Value};

use crate::domain::{Column, ColumnData, Enum, Sheet, SheetType, TypedValue};
use crate::error::{AppError, AppResult};

/// Sort cells ascending by `idx`. Row lookups then use binary search on this
/// ordering (spec §4.2, "cell ordering").
pub fn order_cells(mut cells: Vec<ColumnData>) -> Vec<ColumnData> {
	cells.sort_by_key(|c| c.idx);
	cells
}

/// Binary-search a value at a given row index within an ordered cell slice.
pub fn cell_at_idx(ordered: &[ColumnData], idx: i64) -> Option<&ColumnData> {
	ordered.binary_search_by_key(&idx, |c| c.idx).ok().map(|i| &ordered[i])
}

/// A sheet's row count is `max(|cells| across its columns)` — never stored,
/// always derived.
pub fn row_count(columns: &[(Column, Vec<ColumnData>)]) -> i64 {
	columns.iter().map(|(_, cells)| cells.len() as i64).max().unwrap_or(0)
}

/// Extract the enum values for an `enums` sheet: the first column's
/// non-empty distinct cell values, insertion order preserved.
pub fn extract_enum(sheet: &Sheet, columns: &[(Column, Vec<ColumnData>)]) -> Option<Enum> {
	if sheet.sheet_type != SheetType::Enums {
		return None;
	}
	let (_, cells) = columns.first()?;
	let ordered = order_cells(cells.clone());
	let mut seen = std::collections::HashSet::new();
	let mut values = Vec::new();
	for cell in &ordered {
		if let Some(v) = &cell.value {
			if !v.is_empty() && seen.insert(v.clone()) {
				values.push(v.clone());
			}
		}
	}
	Some(Enum {
		name: sheet.name.clone(),
		sheet_id: sheet.id,
		values,
	})
}

/// Parse a raw cell string per its column type tag.
pub fn parse_typed_value(raw: Option<&str>, type_tag: &str) -> AppResult<TypedValue> {
	let Some(raw) = raw else {
		return Ok(TypedValue::Null);
	};
	match type_tag {
		"text" | "string" => Ok(TypedValue::Text(raw.to_string())),
		"number" | "int" | "float" => {
			let normalized = raw.trim().replace(',', ".");
			if let Ok(i) = normalized.parse::<i64>() {
				Ok(TypedValue::Integer(i))
			} else if let Ok(f) = normalized.parse::<f64>() {
				Ok(TypedValue::Number(f))
			} else {
				Err(AppError::Validation(format!("cannot parse '{}' as a number", raw)))
			}
		}
		"array" => {
			let trimmed = raw.trim();
			if trimmed.starts_with('[') && trimmed.ends_with(']') {
				let parsed: Vec<String> = serde_json::from_str(trimmed)
					.map_err(|e| AppError::Validation(format!("invalid array value: {}", e)))?;
				Ok(TypedValue::Array(parsed))
			} else {
				let parts = trimmed
					.split(',')
					.map(|p| p.trim().to_string())
					.filter(|p| !p.is_empty())
					.collect();
				Ok(TypedValue::Array(parts))
			}
		}
		"bool" | "boolean" => Ok(TypedValue::Bool(raw.trim().to_lowercase() == "true")),
		other => Err(AppError::Validation(format!("unknown column type tag '{}'", other))),
	}
}

/// Render a sheet's columns+cells as the plain JSON shape used by the export
/// endpoint. `list` sheets export as an array of row objects; `map` sheets
/// export as a single object; `enums` sheets are never exported (UI-only).
pub fn to_json_export(sheet: &Sheet, columns: &[(Column, Vec<ColumnData>)]) -> AppResult<Option<Value>> {
	match sheet.sheet_type {
		SheetType::Enums => Ok(None),
		SheetType::Map => {
			let mut obj = JsonMap::new();
			for (column, cells) in columns {
				let ordered = order_cells(cells.clone());
				let value = ordered
					.first()
					.map(|c| parse_typed_value(c.value.as_deref(), &column.column_type))
					.transpose()?
					.unwrap_or(TypedValue::Null);
				obj.insert(column.name.clone(), serde_json::to_value(value).unwrap());
			}
			Ok(Some(Value::Object(obj)))
		}
		SheetType::List => {
			let rows = row_count(columns);
			let mut out = Vec::with_capacity(rows as usize);
			for idx in 0..rows {
				let mut obj = JsonMap::new();
				for (column, cells) in columns {
					let ordered = order_cells(cells.clone());
					let value = match cell_at_idx(&ordered, idx) {
						Some(cell) => parse_typed_value(cell.value.as_deref(), &column.column_type)?,
						None => TypedValue::Null,
					};
					obj.insert(column.name.clone(), serde_json::to_value(value).unwrap());
				}
				out.push(Value::Object(obj));
			}
			Ok(Some(Value::Array(out)))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use uuid::Uuid;

	fn cell(idx: i64, value: Option<&str>) -> ColumnData {
		ColumnData {
			id: Uuid::new_v4(),
			idx,
			value: value.map(|s| s.to_string()),
			cell_type: None,
			column_id: Uuid::new_v4(),
			created_at: Utc::now(),
			updated_at: Utc::now(),
		}
	}

	#[test]
	fn orders_cells_by_idx() {
		let cells = vec![cell(2, Some("c")), cell(0, Some("a")), cell(1, Some("b"))];
		let ordered = order_cells(cells);
		assert_eq!(ordered.iter().map(|c| c.idx).collect::<Vec<_>>(), vec![0, 1, 2]);
	}

	#[test]
	fn row_count_is_max_across_columns() {
		let col_a = Column {
			id: Uuid::new_v4(),
			name: "a".into(),
			column_type: "text".into(),
			required: false,
			sheet_id: Uuid::new_v4(),
			source_column_id: None,
			order_index: 0,
			updated_at: Utc::now(),
		};
		let col_b = col_a.clone();
		let columns = vec![
			(col_a, vec![cell(0, Some("x")), cell(1, Some("y"))]),
			(col_b, vec![cell(0, Some("z"))]),
		];
		assert_eq!(row_count(&columns), 2);
	}

	#[test]
	fn parses_number_with_comma_decimal() {
		let v = parse_typed_value(Some("3,14"), "number").unwrap();
		assert_eq!(v, TypedValue::Number(3.14));
	}

	#[test]
	fn parses_integer_before_float() {
		let v = parse_typed_value(Some("42"), "int").unwrap();
		assert_eq!(v, TypedValue::Integer(42));
	}

	#[test]
	fn parses_bracketed_array_as_json() {
		let v = parse_typed_value(Some(r#"["a","b"]"#), "array").unwrap();
		assert_eq!(v, TypedValue::Array(vec!["a".to_string(), "b".to_string()]));
	}

	#[test]
	fn parses_comma_separated_array_trimming_empties() {
		let v = parse_typed_value(Some("a, b,, c "), "array").unwrap();
		assert_eq!(
			v,
			TypedValue::Array(vec!["a".to_string(), "b".to_string(), "c".to_string()])
		);
	}

	#[test]
	fn parses_bool_case_insensitively() {
		assert_eq!(parse_typed_value(Some("TRUE"), "bool").unwrap(), TypedValue::Bool(true));
		assert_eq!(parse_typed_value(Some("no"), "boolean").unwrap(), TypedValue::Bool(false));
	}

	#[test]
	fn unknown_type_tag_is_an_error() {
		assert!(parse_typed_value(Some("x"), "mystery").is_err());
	}

	#[test]
	fn extracts_enum_from_first_column_distinct_values() {
		let sheet = Sheet {
			id: Uuid::new_v4(),
			name: "colors".into(),
			sheet_type: SheetType::Enums,
			branch_id: Uuid::new_v4(),
			source_sheet_id: None,
			updated_at: Utc::now(),
		};
		let col = Column {
			id: Uuid::new_v4(),
			name: "value".into(),
			column_type: "text".into(),
			required: false,
			sheet_id: sheet.id,
			source_column_id: None,
			order_index: 0,
			updated_at: Utc::now(),
		};
		let columns = vec![(
			col,
			vec![cell(0, Some("red")), cell(1, Some("green")), cell(2, Some("red")), cell(3, None)],
		)];
		let e = extract_enum(&sheet, &columns).unwrap();
		assert_eq!(e.values, vec!["red".to_string(), "green".to_string()]);
	}
}
