//! Typed query composition for list and report endpoints.
//!
//! Filters are expressed as sea-orm `Condition`s over entity columns, so every
//! caller-supplied value travels as a bound parameter. There is deliberately
//! no way to splice raw SQL fragments into a query from here.

use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Select,
};

/// Builder for paginated, filtered entity queries.
pub struct QueryBuilder<E: EntityTrait> {
    query: Select<E>,
    page: u64,
    limit: u64,
}

impl<E: EntityTrait> QueryBuilder<E> {
    pub fn new() -> Self {
        Self {
            query: E::find(),
            page: 1,
            limit: 20,
        }
    }

    /// Add pagination; the limit is capped at 100 to prevent abuse.
    pub fn paginate(mut self, page: u64, limit: u64) -> Self {
        self.page = page.max(1);
        self.limit = limit.clamp(1, 100);
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.query = self.query.filter(condition);
        self
    }

    pub fn order_by<C>(mut self, column: C, desc: bool) -> Self
    where
        C: ColumnTrait,
    {
        self.query = if desc {
            self.query.order_by_desc(column)
        } else {
            self.query.order_by_asc(column)
        };
        self
    }

    /// Execute the query and return one page of results plus the total count.
    pub async fn execute<C>(self, db: &C) -> Result<(Vec<E::Model>, u64), sea_orm::DbErr>
    where
        C: ConnectionTrait,
        E::Model: Send + Sync,
    {
        let paginator = self.query.paginate(db, self.limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(self.page - 1).await?;
        Ok((items, total))
    }
}

impl<E: EntityTrait> Default for QueryBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Conjunctive filter builder: every added predicate must hold.
pub struct FilterBuilder {
    condition: Condition,
    empty: bool,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self {
            condition: Condition::all(),
            empty: true,
        }
    }

    /// Exact match predicate.
    pub fn add_eq<C: ColumnTrait, V>(mut self, column: C, value: V) -> Self
    where
        V: Into<sea_orm::Value>,
    {
        self.condition = self.condition.add(column.eq(value));
        self.empty = false;
        self
    }

    /// Exact match, applied only when the value is present.
    pub fn add_eq_opt<C: ColumnTrait, V>(self, column: C, value: Option<V>) -> Self
    where
        V: Into<sea_orm::Value>,
    {
        match value {
            Some(v) => self.add_eq(column, v),
            None => self,
        }
    }

    /// Substring match predicate, skipped for empty patterns.
    pub fn add_like<C: ColumnTrait>(mut self, column: C, pattern: &str) -> Self {
        if !pattern.is_empty() {
            self.condition = self.condition.add(column.contains(pattern));
            self.empty = false;
        }
        self
    }

    /// Inclusive range predicate.
    pub fn add_between<C: ColumnTrait, V>(mut self, column: C, min: V, max: V) -> Self
    where
        V: Into<sea_orm::Value>,
    {
        self.condition = self.condition.add(column.gte(min)).add(column.lte(max));
        self.empty = false;
        self
    }

    /// Build the final condition; `None` when nothing was added.
    pub fn build(self) -> Option<Condition> {
        if self.empty {
            None
        } else {
            Some(self.condition)
        }
    }
}

impl Default for FilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
