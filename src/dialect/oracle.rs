use super::{
    render_columns, renumber_placeholders, sorted_params, union_columns, Assignment, Dialect,
    LogicalType, ProcParam, Row, SelectSpec,
};
use crate::value::Value;

pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn quote_segment(&self, segment: &str) -> String {
        format!("\"{}\"", segment.to_uppercase().replace('"', "\"\""))
    }

    fn placeholder(&self, i: usize) -> String {
        format!(":{i}")
    }

    fn map_native_type(&self, native: &str) -> LogicalType {
        let lower = native.to_lowercase();
        let base = lower.split('(').next().unwrap_or(&lower);
        match base {
            "number" => LogicalType::Decimal,
            "integer" | "int" | "smallint" => LogicalType::Integer,
            "float" | "binary_float" | "binary_double" => LogicalType::Decimal,
            "varchar2" | "nvarchar2" | "char" | "nchar" | "clob" | "nclob" | "long" => {
                LogicalType::String
            }
            "blob" | "raw" | "long raw" | "bfile" => LogicalType::Binary,
            "date" | "timestamp" => LogicalType::Datetime,
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
            let mut next = spec.filter_param_count + 1;
            sql.push_str(&format!(" OFFSET {} ROWS", self.placeholder(next)));
            params.push(Value::I64(spec.offset));
            next += 1;
            sql.push_str(&format!(" FETCH FIRST {} ROWS ONLY", self.placeholder(next)));
            params.push(Value::I64(spec.limit));
        }
        (sql, params)
    }

    fn build_insert(&self, table: &str, rows: &[Row]) -> (String, Vec<Value>) {
        let columns = union_columns(rows);
        let quoted_columns = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut params = Vec::new();
        let mut next = 1;

        if rows.len() == 1 {
            let row = &rows[0];
            let cells: Vec<String> = columns
                .iter()
                .map(|col| match row.get(col) {
                    Some(v) => {
                        let ph = self.placeholder(next);
                        next += 1;
                        params.push(v.clone());
                        ph
                    }
                    None => "DEFAULT".to_string(),
                })
                .collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.quote_ident(table),
                quoted_columns,
                cells.join(", ")
            );
            return (sql, params);
        }

        let mut into_clauses = Vec::with_capacity(rows.len());
        for row in rows {
            let cells: Vec<String> = columns
                .iter()
                .map(|col| match row.get(col) {
                    Some(v) => {
                        let ph = self.placeholder(next);
                        next += 1;
                        params.push(v.clone());
                        ph
                    }
                    None => "DEFAULT".to_string(),
                })
                .collect();
            into_clauses.push(format!(
                "INTO {} ({}) VALUES ({})",
                self.quote_ident(table),
                quoted_columns,
                cells.join(", ")
            ));
        }
        let sql = format!(
            "INSERT ALL {} SELECT 1 FROM DUAL",
            into_clauses.join(" ")
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
        let shifted_filter = renumber_placeholders(filter_fragment, ":", next);
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
                format!("\"{}\" => {}", p.name, self.placeholder(idx + 1))
            })
            .collect();
        let sql = format!("BEGIN {}({}); END;", name, args.join(", "));
        Ok((sql, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn select_with_pagination() {
        let d = OracleDialect;
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
        assert_eq!(
            sql,
            "SELECT * FROM \"USERS\" OFFSET :1 ROWS FETCH FIRST :2 ROWS ONLY"
        );
        assert_eq!(params, vec![Value::I64(10), Value::I64(20)]);
    }

    #[test]
    fn single_row_insert_is_plain() {
        let d = OracleDialect;
        let mut row = Row::new();
        row.insert("email".into(), Value::Text("a@b".into()));
        let (sql, params) = d.build_insert("users", &[row]);
        assert_eq!(sql, "INSERT INTO \"USERS\" (\"EMAIL\") VALUES (:1)");
        assert_eq!(params, vec![Value::Text("a@b".into())]);
    }

    #[test]
    fn multi_row_insert_uses_insert_all() {
        let d = OracleDialect;
        let mut r1 = Row::new();
        r1.insert("email".into(), Value::Text("a@b".into()));
        let mut r2 = Row::new();
        r2.insert("email".into(), Value::Text("c@d".into()));
        let (sql, _) = d.build_insert("users", &[r1, r2]);
        assert!(sql.starts_with("INSERT ALL "));
        assert!(sql.ends_with("SELECT 1 FROM DUAL"));
    }

    #[test]
    fn identifiers_uppercase() {
        let d = OracleDialect;
        assert_eq!(d.quote_ident("app.users"), "\"APP\".\"USERS\"");
    }
}
