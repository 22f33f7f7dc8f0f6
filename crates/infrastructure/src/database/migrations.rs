//! 内嵌的SQLite表结构
//!
//! 所有语句都是幂等的，可以在每次启动时执行。

use regreport_core::ReportingResult;
use sqlx::SqlitePool;
use tracing::{debug, info};

const SCHEMA: &[(&str, &str)] = &[
    (
        "report_schedules",
        r#"
        CREATE TABLE IF NOT EXISTS report_schedules (
            schedule_id TEXT PRIMARY KEY,
            report_type TEXT NOT NULL,
            format TEXT NOT NULL,
            institution_id TEXT NOT NULL,
            jurisdiction TEXT NOT NULL,
            cron_expression TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 2,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            next_run_time DATETIME,
            last_run_time DATETIME,
            dependencies TEXT NOT NULL DEFAULT '[]',
            max_retries INTEGER NOT NULL DEFAULT 3,
            retry_delay_minutes INTEGER NOT NULL DEFAULT 30,
            timeout_minutes INTEGER NOT NULL DEFAULT 120,
            resource_requirements TEXT NOT NULL DEFAULT '{}',
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "scheduled_jobs",
        r#"
        CREATE TABLE IF NOT EXISTS scheduled_jobs (
            job_id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            report_type TEXT NOT NULL,
            format TEXT NOT NULL,
            institution_id TEXT NOT NULL,
            jurisdiction TEXT NOT NULL,
            reporting_period TEXT NOT NULL,
            scheduled_time DATETIME NOT NULL,
            started_time DATETIME,
            completed_time DATETIME,
            status TEXT NOT NULL,
            priority INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            retry_delay_minutes INTEGER NOT NULL DEFAULT 30,
            timeout_minutes INTEGER NOT NULL DEFAULT 120,
            resource_pool TEXT NOT NULL,
            result_data TEXT,
            resource_allocation TEXT,
            dependencies_met BOOLEAN NOT NULL DEFAULT 1,
            dependency_jobs TEXT NOT NULL DEFAULT '[]',
            error_message TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "compliance_reports",
        r#"
        CREATE TABLE IF NOT EXISTS compliance_reports (
            report_id TEXT PRIMARY KEY,
            report_type TEXT NOT NULL,
            format TEXT NOT NULL,
            reporting_period TEXT NOT NULL,
            institution_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            checksum TEXT NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "report_generation_status",
        r#"
        CREATE TABLE IF NOT EXISTS report_generation_status (
            report_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            error_message TEXT,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "institutions",
        r#"
        CREATE TABLE IF NOT EXISTS institutions (
            institution_id TEXT PRIMARY KEY,
            institution_name TEXT NOT NULL,
            institution_code TEXT NOT NULL,
            jurisdiction TEXT NOT NULL DEFAULT 'EU',
            currency TEXT NOT NULL DEFAULT 'EUR',
            is_active BOOLEAN NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "finrep_data",
        r#"
        CREATE TABLE IF NOT EXISTS finrep_data (
            institution_id TEXT NOT NULL,
            reporting_period TEXT NOT NULL,
            cash_balances REAL NOT NULL DEFAULT 0,
            financial_assets_hft REAL NOT NULL DEFAULT 0,
            financial_assets_mandatorily_fvtpl REAL NOT NULL DEFAULT 0,
            financial_assets_designated_fvtpl REAL NOT NULL DEFAULT 0,
            financial_assets_fvoci REAL NOT NULL DEFAULT 0,
            financial_assets_amortised_cost REAL NOT NULL DEFAULT 0,
            derivatives_hedge_accounting REAL NOT NULL DEFAULT 0,
            investments_subsidiaries REAL NOT NULL DEFAULT 0,
            tangible_assets REAL NOT NULL DEFAULT 0,
            intangible_assets REAL NOT NULL DEFAULT 0,
            tax_assets REAL NOT NULL DEFAULT 0,
            other_assets REAL NOT NULL DEFAULT 0,
            total_assets REAL NOT NULL DEFAULT 0,
            financial_liabilities_hft REAL NOT NULL DEFAULT 0,
            financial_liabilities_designated_fvtpl REAL NOT NULL DEFAULT 0,
            financial_liabilities_amortised_cost REAL NOT NULL DEFAULT 0,
            derivatives_hedge_accounting_liab REAL NOT NULL DEFAULT 0,
            provisions REAL NOT NULL DEFAULT 0,
            tax_liabilities REAL NOT NULL DEFAULT 0,
            other_liabilities REAL NOT NULL DEFAULT 0,
            total_liabilities REAL NOT NULL DEFAULT 0,
            capital REAL NOT NULL DEFAULT 0,
            retained_earnings REAL NOT NULL DEFAULT 0,
            accumulated_oci REAL NOT NULL DEFAULT 0,
            other_reserves REAL NOT NULL DEFAULT 0,
            total_equity REAL NOT NULL DEFAULT 0,
            interest_income REAL NOT NULL DEFAULT 0,
            interest_expenses REAL NOT NULL DEFAULT 0,
            net_interest_income REAL NOT NULL DEFAULT 0,
            fee_income REAL NOT NULL DEFAULT 0,
            fee_expenses REAL NOT NULL DEFAULT 0,
            net_fee_income REAL NOT NULL DEFAULT 0,
            trading_income REAL NOT NULL DEFAULT 0,
            other_operating_income REAL NOT NULL DEFAULT 0,
            total_operating_income REAL NOT NULL DEFAULT 0,
            staff_expenses REAL NOT NULL DEFAULT 0,
            other_administrative_expenses REAL NOT NULL DEFAULT 0,
            depreciation REAL NOT NULL DEFAULT 0,
            total_operating_expenses REAL NOT NULL DEFAULT 0,
            impairment_losses REAL NOT NULL DEFAULT 0,
            profit_before_tax REAL NOT NULL DEFAULT 0,
            tax_expense REAL NOT NULL DEFAULT 0,
            net_profit REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (institution_id, reporting_period)
        )
        "#,
    ),
    (
        "corep_data",
        r#"
        CREATE TABLE IF NOT EXISTS corep_data (
            institution_id TEXT NOT NULL,
            reporting_period TEXT NOT NULL,
            tier1_capital REAL NOT NULL DEFAULT 0,
            tier2_capital REAL NOT NULL DEFAULT 0,
            total_capital REAL NOT NULL DEFAULT 0,
            risk_weighted_assets REAL NOT NULL DEFAULT 0,
            capital_ratio REAL NOT NULL DEFAULT 0,
            leverage_ratio REAL NOT NULL DEFAULT 0,
            liquidity_coverage_ratio REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (institution_id, reporting_period)
        )
        "#,
    ),
    (
        "dora_data",
        r#"
        CREATE TABLE IF NOT EXISTS dora_data (
            institution_id TEXT NOT NULL,
            reporting_period TEXT NOT NULL,
            ict_incidents_count INTEGER NOT NULL DEFAULT 0,
            major_incidents_count INTEGER NOT NULL DEFAULT 0,
            third_party_providers_count INTEGER NOT NULL DEFAULT 0,
            critical_services_count INTEGER NOT NULL DEFAULT 0,
            business_continuity_tests INTEGER NOT NULL DEFAULT 0,
            recovery_time_objective REAL NOT NULL DEFAULT 0,
            recovery_point_objective REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (institution_id, reporting_period)
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_schedules_due ON report_schedules(status, next_run_time)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_schedule_period ON scheduled_jobs(schedule_id, reporting_period)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON scheduled_jobs(status)",
    "CREATE INDEX IF NOT EXISTS idx_reports_created_at ON compliance_reports(created_at)",
];

/// 创建全部表和索引
pub async fn run_migrations(pool: &SqlitePool) -> ReportingResult<()> {
    info!("运行SQLite数据库迁移");

    for (table, statement) in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
        debug!("表 {} 已就绪", table);
    }
    for statement in INDEXES {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("数据库迁移完成");
    Ok(())
}
