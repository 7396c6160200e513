use super::{
    render_columns, renumber_placeholders, sorted_params, union_columns, Assignment, Dialect,
    LogicalType, ProcParam, Row, SelectSpec,
};
use crate::value::Value;

pub struct MssqlDialect;

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_segment(&self, segment: &str) -> String {
        format!("[{}]", segment.replace(']', "]]"))
    }

    fn placeholder(&self, i: usize) -> String {
        format!("@p{i}")
    }

    fn map_native_type(&self, native: &str) -> LogicalType {
        let lower = native.to_lowercase();
        let base = lower.split('(').next().unwrap_or(&lower);
        match base {
            "bit" => LogicalType::Boolean,
            "tinyint" | "smallint" | "int" | "bigint" => LogicalType::Integer,
            "decimal" | "numeric" | "money" | "smallmoney" | "float" | "real" => {
                LogicalType::Decimal
            }
            "char" | "varchar" | "nchar" | "nvarchar" | "text" | "ntext" | "uniqueidentifier" => {
                LogicalType::String
            }
            "binary" | "varbinary" | "image" => LogicalType::Binary,
            "date" | "datetime" | "datetime2" | "smalldatetime" | "time" | "datetimeoffset" => {
                LogicalType::Datetime
            }
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
        let mut params = Vec::new();
        let paginating = spec.limit > 0 || spec.offset > 0;
        match spec.order_by {
            Some(order) => sql.push_str(&format!(" ORDER BY {order}")),
            None if paginating => sql.push_str(" ORDER BY (SELECT NULL)"),
            None => {}
        }
        if paginating {
            let mut next = spec.filter_param_count + 1;
            sql.push_str(&format!(" OFFSET {} ROWS", self.placeholder(next)));
            params.push(Value::I64(spec.offset));
            next += 1;
            sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", self.placeholder(next)));
            params.push(Value::I64(spec.limit));
        }
        (sql, params)
    }

    fn build_insert(&self, table: &str, rows: &[Row]) -> (String, Vec<Value>) {
        let columns = union_columns(rows);
        let mut params = Vec::new();
        let mut next = 1;
        let mut row_clauses = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = Vec::with_capacity(columns.len());
            for col in &columns {
                match row.get(col) {
                    Some(v) => {
                        cells.push(self.placeholder(next));
                        next += 1;
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
        let mut next = 1;
        let sets: Vec<String> = assignments
            .iter()
            .map(|(col, val)| {
                let ph = self.placeholder(next);
                next += 1;
                params.push(val.clone());
                format!("{} = {}", self.quote_ident(col), ph)
            })
            .collect();
        let shifted_filter = renumber_placeholders(filter_fragment, "@p", next);
        params.extend_from_slice(filter_params);
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.quote_ident(table),
            sets.join(", "),
            shifted_filter
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
        let args: Vec<String> = sorted
            .iter()
            .enumerate()
            .map(|(idx, p)| {
                values.push(p.value.clone());
                format!("@{} = {}", p.name, self.placeholder(idx + 1))
            })
            .collect();
        let sql = format!("EXEC {} {}", name, args.join(", "));
        Ok((sql, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn select_synthesizes_order_by_when_paginating() {
        let d = MssqlDialect;
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
        assert_eq!(
            sql,
            "SELECT * FROM [users] ORDER BY (SELECT NULL) OFFSET @p1 ROWS FETCH NEXT @p2 ROWS ONLY"
        );
        assert_eq!(params, vec![Value::I64(0), Value::I64(20)]);
    }

    #[test]
    fn select_without_pagination_has_no_order_by() {
        let d = MssqlDialect;
        let cols = vec![];
        let spec = SelectSpec {
            table: "users",
            columns: &cols,
            filter_fragment: None,
            filter_param_count: 0,
            order_by: None,
            limit: 0,
            offset: 0,
        };
        let (sql, _) = d.build_select(&spec);
        assert_eq!(sql, "SELECT * FROM [users]");
    }

    #[test]
    fn insert_sparse_rows() {
        let d = MssqlDialect;
        let mut r1 = Row::new();
        r1.insert("name".into(), Value::Text("A".into()));
        r1.insert("email".into(), Value::Text("a@b".into()));
        let mut r2 = Row::new();
        r2.insert("email".into(), Value::Text("c@d".into()));
        let (sql, params) = d.build_insert("users", &[r1, r2]);
        assert_eq!(
            sql,
            "INSERT INTO [users] ([email], [name]) VALUES (@p1, @p2), (@p3, DEFAULT)"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("a@b".into()),
                Value::Text("A".into()),
                Value::Text("c@d".into())
            ]
        );
    }
}
