use std::fmt;

/// Comparison operators understood by the row API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Is,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Neq => "neq",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Lt => "lt",
            Op::Lte => "lte",
            Op::In => "in",
            Op::Is => "is",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: Op,
    pub value: String,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: Op, value: impl fmt::Display) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.to_string(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl fmt::Display) -> Self {
        Self::new(column, Op::Eq, value)
    }

    /// `eq.value`, `in.(a,b)`, as the row API expects after `column=`.
    pub fn operand(&self) -> String {
        match self.op {
            Op::In => format!("in.({})", self.value),
            op => format!("{}.{}", op.as_str(), self.value),
        }
    }

    /// `column=eq.value`, the form realtime subscriptions take.
    pub fn realtime_expr(&self) -> String {
        format!("{}={}", self.column, self.operand())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A filtered, ordered read (or the target set of an update/delete) on one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: String,
    columns: String,
    filters: Vec<Filter>,
    order: Vec<Order>,
    limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn gte(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(Filter::new(column, Op::Gte, value))
    }

    pub fn lte(self, column: &str, value: impl fmt::Display) -> Self {
        self.filter(Filter::new(column, Op::Lte, value))
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> &[Order] {
        &self.order
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Query-string parameters for a read.
    pub fn read_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.filter_params());
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|o| {
                    format!(
                        "{}.{}",
                        o.column,
                        if o.ascending { "asc" } else { "desc" }
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Query-string parameters selecting the rows an update or delete touches.
    pub fn filter_params(&self) -> Vec<(String, String)> {
        self.filters
            .iter()
            .map(|f| (f.column.clone(), f.operand()))
            .collect()
    }
}
