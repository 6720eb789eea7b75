use serde::Serialize;

use vinoteka_core::config::{AppConfig, LoadOptions};
use vinoteka_core::domain::sync::SyncTaskState;
use vinoteka_db::migrations::MIGRATOR;
use vinoteka_db::repositories::{SqlSyncQueueRepository, SyncQueueRepository};
use vinoteka_db::{connect_with_settings, DbPool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: format!(
                    "configuration loaded; locales `{}`/`{}`",
                    config.locales.default, config.locales.alternate
                ),
            });
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in DATABASE_CHECKS {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

const DATABASE_CHECKS: [&str; 3] = ["database_connectivity", "schema_version", "sync_queue"];

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to connect to database: {error}"),
                }];
            }
        };

        let checks = vec![
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            },
            check_schema_version(&pool).await,
            check_sync_queue(&pool).await,
        ];
        pool.close().await;
        checks
    })
}

async fn check_schema_version(pool: &DbPool) -> DoctorCheck {
    let expected = MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).count()
        as i64;
    let applied = sqlx_applied_migrations(pool).await;

    match applied {
        Ok(applied) if applied == expected => DoctorCheck {
            name: "schema_version",
            status: CheckStatus::Pass,
            details: format!("{applied} migrations applied"),
        },
        Ok(applied) => DoctorCheck {
            name: "schema_version",
            status: CheckStatus::Fail,
            details: format!("{applied} of {expected} migrations applied; run `vinoteka migrate`"),
        },
        Err(error) => DoctorCheck {
            name: "schema_version",
            status: CheckStatus::Fail,
            details: format!("schema not initialized ({error}); run `vinoteka migrate`"),
        },
    }
}

async fn sqlx_applied_migrations(pool: &DbPool) -> Result<i64, String> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .map_err(|error| error.to_string())
}

async fn check_sync_queue(pool: &DbPool) -> DoctorCheck {
    let queue = SqlSyncQueueRepository::new(pool.clone());
    match queue.count_by_state().await {
        Ok(counts) => {
            let failed = counts
                .iter()
                .find(|(state, _)| *state == SyncTaskState::FailedTerminal)
                .map(|(_, count)| *count)
                .unwrap_or(0);
            let rendered: Vec<String> =
                counts.iter().map(|(state, count)| format!("{}={count}", state.as_str())).collect();
            DoctorCheck {
                name: "sync_queue",
                status: if failed == 0 { CheckStatus::Pass } else { CheckStatus::Fail },
                details: if failed == 0 {
                    rendered.join(", ")
                } else {
                    format!(
                        "{}; inspect with `vinoteka sync drift`, clear with `vinoteka sync purge`",
                        rendered.join(", ")
                    )
                },
            }
        }
        Err(error) => DoctorCheck {
            name: "sync_queue",
            status: CheckStatus::Fail,
            details: format!("sync queue unreadable: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
