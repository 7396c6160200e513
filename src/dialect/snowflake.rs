use super::{
    render_columns, sorted_params, union_columns, Assignment, Dialect, LogicalType, ProcParam,
    Row, SelectSpec,
};
use crate::value::Value;

pub struct SnowflakeDialect;

impl Dialect for SnowflakeDialect {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn quote_segment(&self, segment: &str) -> String {
        format!("\"{}\"", segment.replace('"', "\"\""))
    }

    fn placeholder(&self, _i: usize) -> String {
        "?".to_string()
    }

    fn map_native_type(&self, native: &str) -> LogicalType {
        let lower = native.to_lowercase();
        let base = lower.split('(').next().unwrap_or(&lower);
        match base {
            "boolean" => LogicalType::Boolean,
            "number" | "decimal" | "numeric" | "float" | "double" | "real" => {
                LogicalType::Decimal
            }
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "byteint" => {
                LogicalType::Integer
            }
            "varchar" | "char" | "character" | "string" | "text" => LogicalType::String,
            "binary" | "varbinary" => LogicalType::Binary,
            "date" | "datetime" | "time" | "timestamp" | "timestamp_ltz" | "timestamp_ntz"
            | "timestamp_tz" => LogicalType::Datetime,
            "variant" | "object" | "array" => LogicalType::Json,
            _ => LogicalType::String,
        }
    }

    fn build_select(&self, spec: &SelectSpec) -> (String, Vec<Value>) {
        let mut sql = format!(
            "SELECT {} FROM {}",
            render_columns(self, spec.columns),
            self.quote_ident(spec.table)
        );
        if let Some(filter) = spec.filter_fragment {
            sql.push_str(&format!(" WHERE {filter}"));
        }
        if let Some(order) = spec.order_by {
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        let mut params = Vec::new();
        if spec.limit > 0 || spec.offset > 0 {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::I64(spec.limit));
            params.push(Value::I64(spec.offset));
        }
        (sql, params)
    }

    fn build_insert(&self, table: &str, rows: &[Row]) -> (String, Vec<Value>) {
        let columns = union_columns(rows);
        let mut params = Vec::new();
        let mut row_clauses = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = Vec::with_capacity(columns.len());
            for col in &columns {
                match row.get(col) {
                    Some(v) => {
                        cells.push("?".to_string());
                        params.push(v.clone());
                    }
                    None => cells.push("DEFAULT".to_string()),
                }
            }
            row_clauses.push(format!("({})", cells.join(", ")));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote_ident(table),
            columns
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            row_clauses.join(", ")
        );
        (sql, params)
    }

    fn build_update(
        &self,
        table: &str,
        assignments: &[Assignment],
        filter_fragment: &str,
        filter_params: &[Value],
    ) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sets: Vec<String> = assignments
            .iter()
            .map(|(col, val)| {
                params.push(val.clone());
                format!("{} = ?", self.quote_ident(col))
            })
            .collect();
        params.extend_from_slice(filter_params);
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.quote_ident(table),
            sets.join(", "),
            filter_fragment
        );
        (sql, params)
    }

    fn build_delete(
        &self,
        table: &str,
        filter_fragment: &str,
        filter_params: &[Value],
    ) -> (String, Vec<Value>) {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.quote_ident(table),
            filter_fragment
        );
        (sql, filter_params.to_vec())
    }

    fn build_call(
        &self,
        name: &str,
        params: &[ProcParam],
    ) -> Result<(String, Vec<Value>), super::UnsupportedOperation> {
        let sorted = sorted_params(params);
        let mut values = Vec::with_capacity(sorted.len());
        let placeholders: Vec<&str> = sorted
            .iter()
            .map(|p| {
                values.push(p.value.clone());
                "?"
            })
            .collect();
        let sql = format!("CALL {}({})", name, placeholders.join(", "));
        Ok((sql, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn select_with_pagination() {
        let d = SnowflakeDialect;
        let cols = vec![];
        let spec = SelectSpec {
            table: "users",
            columns: &cols,
            filter_fragment: None,
            filter_param_count: 0,
            order_by: None,
            limit: 20,
            offset: 0,
        };
        let (sql, params) = d.build_select(&spec);
        assert_eq!(sql, "SELECT * FROM \"users\" LIMIT ? OFFSET ?");
        assert_eq!(params, vec![Value::I64(20), Value::I64(0)]);
    }

    #[test]
    fn quote_ident_three_part() {
        let d = SnowflakeDialect;
        assert_eq!(
            d.quote_ident("db.schema.users"),
            "\"db\".\"schema\".\"users\""
        );
    }

    #[test]
    fn variant_maps_to_json() {
        let d = SnowflakeDialect;
        assert_eq!(d.map_native_type("variant"), LogicalType::Json);
    }
}
