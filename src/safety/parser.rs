//! SQL parsing and classification logic.
//!
//! Athena speaks a Trino/Hive flavored SQL, so statements are parsed with
//! the generic dialect. Anything unparseable or unrecognized is destructive.

use sqlparser::ast::{Query, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::{ClassificationResult, SafetyLevel, StatementType};

const DESTRUCTIVE_WARNING: &str = "This action cannot be undone.";

/// Level and kind of one statement or sub-query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Verdict {
    level: SafetyLevel,
    kind: StatementType,
}

impl Verdict {
    fn new(level: SafetyLevel, kind: StatementType) -> Self {
        Self { level, kind }
    }

    fn read() -> Self {
        Self::new(SafetyLevel::Safe, StatementType::Select)
    }

    /// Keeps `self` unless `other` is strictly more dangerous, so ties
    /// report the first statement seen.
    fn worst(self, other: Verdict) -> Verdict {
        if other.level > self.level {
            other
        } else {
            self
        }
    }
}

/// Parses and classifies SQL.
#[derive(Debug)]
pub struct SqlClassifier {
    dialect: GenericDialect,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    pub fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// Classifies a SQL string. Several statements take the level of the
    /// most dangerous one.
    pub fn classify(&self, sql: &str) -> ClassificationResult {
        let statements = match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => statements,
            Err(e) => {
                return ClassificationResult::with_warning(
                    SafetyLevel::Destructive,
                    StatementType::Unknown,
                    format!("Could not parse SQL ({e}). Please review carefully."),
                )
            }
        };

        let mut verdicts = statements.iter().map(statement_verdict);
        let Some(first) = verdicts.next() else {
            return ClassificationResult::with_warning(
                SafetyLevel::Destructive,
                StatementType::Unknown,
                "Empty SQL statement",
            );
        };
        let worst = verdicts.fold(first, Verdict::worst);
        let kind = if statements.len() > 1 {
            StatementType::Multiple(Box::new(worst.kind))
        } else {
            worst.kind
        };

        match worst.level {
            SafetyLevel::Destructive => {
                ClassificationResult::with_warning(worst.level, kind, DESTRUCTIVE_WARNING)
            }
            level => ClassificationResult::new(level, kind),
        }
    }
}

/// Classifies SQL without creating a classifier instance.
pub fn classify_sql(sql: &str) -> ClassificationResult {
    SqlClassifier::new().classify(sql)
}

fn statement_verdict(statement: &Statement) -> Verdict {
    use SafetyLevel::{Destructive, Mutating, Safe};

    match statement {
        Statement::Query(query) => query_verdict(query),
        // EXPLAIN ANALYZE runs the statement.
        Statement::Explain {
            analyze: true,
            statement,
            ..
        } => Verdict::new(statement_verdict(statement).level, StatementType::Explain),
        Statement::Explain { .. } => Verdict::new(Safe, StatementType::Explain),
        Statement::ExplainTable { .. } => Verdict::new(Safe, StatementType::Describe),
        Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => Verdict::new(Safe, StatementType::Show),

        Statement::Insert(_) => Verdict::new(Mutating, StatementType::Insert),
        Statement::Update { .. } => Verdict::new(Mutating, StatementType::Update),
        Statement::Merge { .. } => Verdict::new(Mutating, StatementType::Merge),
        Statement::Unload { .. } => Verdict::new(Mutating, StatementType::Unload),
        Statement::Msck { .. } => Verdict::new(Mutating, StatementType::RepairTable),
        // OR REPLACE drops the existing table first.
        Statement::CreateTable(create) if create.query.is_some() && !create.or_replace => {
            Verdict::new(Mutating, StatementType::CreateTableAs)
        }

        Statement::CreateTable(_)
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. } => Verdict::new(Destructive, StatementType::Create),
        Statement::AlterTable { .. } | Statement::AlterView { .. } => {
            Verdict::new(Destructive, StatementType::Alter)
        }
        Statement::Delete(_) => Verdict::new(Destructive, StatementType::Delete),
        Statement::Drop { .. } => Verdict::new(Destructive, StatementType::Drop),

        _ => Verdict::new(Destructive, StatementType::Unknown),
    }
}

/// The query body and every CTE must be read-only for the query to be.
fn query_verdict(query: &Query) -> Verdict {
    let ctes = query
        .with
        .iter()
        .flat_map(|with| &with.cte_tables)
        .map(|cte| query_verdict(&cte.query));
    ctes.fold(Verdict::read(), Verdict::worst)
        .worst(set_expr_verdict(&query.body))
}

fn set_expr_verdict(body: &SetExpr) -> Verdict {
    match body {
        SetExpr::Select(select) => select
            .from
            .iter()
            .map(relation_verdict)
            .fold(Verdict::read(), Verdict::worst),
        SetExpr::Query(query) => query_verdict(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_verdict(left).worst(set_expr_verdict(right))
        }
        SetExpr::Insert(stmt) => statement_verdict(stmt),
        SetExpr::Update(stmt) => statement_verdict(stmt),
        SetExpr::Values(_) | SetExpr::Table(_) => Verdict::read(),
    }
}

fn relation_verdict(relation: &TableWithJoins) -> Verdict {
    relation
        .joins
        .iter()
        .map(|join| factor_verdict(&join.relation))
        .fold(factor_verdict(&relation.relation), Verdict::worst)
}

fn factor_verdict(factor: &TableFactor) -> Verdict {
    match factor {
        TableFactor::Derived { subquery, .. } => query_verdict(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => relation_verdict(table_with_joins),
        _ => Verdict::read(),
    }
}
