use super::{
    render_columns, union_columns, Assignment, Dialect, LogicalType, ProcParam, Row, SelectSpec,
    UnsupportedOperation,
};
use crate::value::Value;

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
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
            "integer" | "int" | "bigint" | "smallint" | "tinyint" => LogicalType::Integer,
            "real" | "double" | "float" | "numeric" | "decimal" => LogicalType::Decimal,
            "text" | "varchar" | "char" | "clob" => LogicalType::String,
            "blob" => LogicalType::Binary,
            "date" | "datetime" | "timestamp" => LogicalType::Datetime,
            _ => LogicalType::String,
        }
    }

    fn supports_multi_row_insert(&self) -> bool {
        false
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
        if spec.limit > 0 || spec.offset > 0 {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", spec.limit, spec.offset));
        }
        (sql, Vec::new())
    }

    fn build_insert(&self, table: &str, rows: &[Row]) -> (String, Vec<Value>) {
        let row = rows
            .first()
            .expect("caller passes exactly one row for sqlite");
        let columns = union_columns(std::slice::from_ref(row));
        let mut params = Vec::with_capacity(columns.len());
        let cells: Vec<&str> = columns
            .iter()
            .map(|col| {
                let v = row.get(col).expect("column drawn from this row's keys");
                params.push(v.clone());
                "?"
            })
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            columns
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            cells.join(", ")
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
        _name: &str,
        _params: &[ProcParam],
    ) -> Result<(String, Vec<Value>), UnsupportedOperation> {
        Err(UnsupportedOperation {
            dialect: self.name(),
            operation: "callable routines",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn pagination_is_inlined_not_parameterized() {
        let d = SqliteDialect;
        let cols = vec![];
        let spec = SelectSpec {
            table: "users",
            columns: &cols,
            filter_fragment: None,
            filter_param_count: 0,
            order_by: None,
            limit: 20,
            offset: 10,
        };
        let (sql, params) = d.build_select(&spec);
        assert_eq!(sql, "SELECT * FROM \"users\" LIMIT 20 OFFSET 10");
        assert!(params.is_empty());
    }

    #[test]
    fn multi_row_insert_unsupported() {
        let d = SqliteDialect;
        assert!(!d.supports_multi_row_insert());
    }

    #[test]
    fn call_is_unsupported() {
        let d = SqliteDialect;
        let err = d.build_call("proc", &[]).unwrap_err();
        assert_eq!(err.dialect, "sqlite");
    }
}
