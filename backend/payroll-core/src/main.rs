// src/main.rs
use anyhow::{bail, Context, Result};
use chrono::Weekday;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payroll_core::config::{load_salary_rules, StorageConfig};
use payroll_core::dataset::Dataset;
use payroll_core::employee::{EmployeeInput, EmployeeRecord, EmployeeUpdate};
use payroll_core::import::read_employees_from_path;
use payroll_core::persistence::{LoadOutcome, PersistenceManager, SaveOutcome};
use payroll_core::register::PayrollRegister;
use payroll_core::salary::SalaryRules;
use payroll_core::storage::FileStorage;

#[derive(Parser, Debug)]
#[command(name = "payroll", version, about = "Monthly attendance register and salary computation")]
struct Cli {
    /// Overrides PAYROLL_STORAGE_DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Accept employee data that only raised warnings (e.g. a very high gross).
    #[arg(long, global = true)]
    accept_warnings: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an empty register for a calendar month.
    Init {
        year: i32,
        month: u32,
        /// Replace an existing register.
        #[arg(long)]
        force: bool,
    },
    /// Add one employee.
    Add {
        emp_id: String,
        name: String,
        gross: String,
        #[arg(long)]
        opening_cl: Option<String>,
    },
    /// Add employees from a CSV sheet (empId,name,gross,... columns).
    Import { file: PathBuf },
    /// Mark attendance for one employee. Days are 1-based days of the month.
    Mark {
        emp_id: String,
        day: usize,
        code: String,
        /// Last day of a range, inclusive.
        #[arg(long)]
        to: Option<usize>,
    },
    /// Mark the given days for every employee.
    Bulk {
        code: String,
        #[arg(long, value_delimiter = ',', required = true)]
        days: Vec<usize>,
    },
    /// Mark every occurrence of a weekday for every employee, e.g. `weekday Sun WO`.
    Weekday {
        #[arg(value_parser = parse_weekday)]
        weekday: Weekday,
        code: String,
    },
    /// Change profile fields of an employee.
    Update {
        emp_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        gross: Option<Decimal>,
        #[arg(long)]
        opening_cl: Option<Decimal>,
        #[arg(long)]
        bonus: Option<Decimal>,
        #[arg(long)]
        other_allowance: Option<Decimal>,
        #[arg(long)]
        ot: Option<Decimal>,
        #[arg(long)]
        other_deduction: Option<Decimal>,
        #[arg(long)]
        epf_no: Option<String>,
        #[arg(long)]
        esi_no: Option<String>,
    },
    /// Delete an employee and their attendance.
    Remove { emp_id: String },
    /// Print the register, or one employee's pay slip.
    Show { emp_id: Option<String> },
    /// List backup snapshots and storage usage.
    Backups,
    /// Replace the register with a backup snapshot.
    Restore { key: String },
    /// Delete the stored register. Backups are kept.
    Clear,
}

fn parse_weekday(raw: &str) -> Result<Weekday, String> {
    raw.parse::<Weekday>()
        .map_err(|_| format!("'{}' is not a weekday (Mon..Sun)", raw))
}

fn main() -> Result<()> {
    // --- Setup ---
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let rules = load_salary_rules().context("Salary configuration rejected")?;
    let mut storage_config = StorageConfig::from_env().context("Storage configuration rejected")?;
    if let Some(dir) = cli.data_dir.clone() {
        storage_config.data_dir = dir;
    }
    let storage = FileStorage::open(&storage_config.data_dir)
        .with_context(|| format!("Cannot open data directory {:?}", storage_config.data_dir))?;
    let mut pm = PersistenceManager::open(storage, rules.clone())?.with_limits(storage_config.limits());
    info!("Using data directory {:?}", storage_config.data_dir);

    run(cli, &mut pm, rules)
}

fn run(cli: Cli, pm: &mut PersistenceManager<FileStorage>, rules: SalaryRules) -> Result<()> {
    let accept_warnings = cli.accept_warnings;

    match cli.command {
        Command::Init { year, month, force } => {
            if !force && pm.load()?.into_dataset().is_some() {
                bail!("A register already exists; pass --force to replace it");
            }
            let dataset = Dataset::for_month(year, month)
                .with_context(|| format!("{}-{:02} is not a calendar month", year, month))?;
            let outcome = pm.save(&dataset)?;
            report_save(&outcome);
            println!("Started register for {} ({} days)", dataset.month, dataset.day_count());
        }

        Command::Add {
            emp_id,
            name,
            gross,
            opening_cl,
        } => {
            let mut register = open_register(pm, rules, accept_warnings)?;
            let mut input = EmployeeInput::new(&emp_id, &name, &gross);
            input.opening_cl = opening_cl;
            let record = register.add_employee(input)?;
            print_slip(record);
            save(pm, &register)?;
        }

        Command::Import { file } => {
            let inputs = read_employees_from_path(&file)?;
            let mut register = open_register(pm, rules, accept_warnings)?;
            let report = register.bulk_add(inputs);
            for (row, emp_id, reason) in &report.rejected {
                println!("row {:>4} {:<12} rejected: {}", row, emp_id, reason);
            }
            println!("{} employees added, {} rows rejected", report.added.len(), report.rejected.len());
            if !report.added.is_empty() {
                save(pm, &register)?;
            }
        }

        Command::Mark {
            emp_id,
            day,
            code,
            to,
        } => {
            let mut register = open_register(pm, rules, accept_warnings)?;
            let from = day_index(day)?;
            let record = match to {
                Some(to) => register.assign_range(&emp_id, from, day_index(to)?, &code)?,
                None => register.set_attendance(&emp_id, from, &code)?,
            };
            print_slip(record);
            save(pm, &register)?;
        }

        Command::Bulk { code, days } => {
            let mut register = open_register(pm, rules, accept_warnings)?;
            let indices = days
                .into_iter()
                .map(day_index)
                .collect::<Result<Vec<_>>>()?;
            let cells = register.bulk_update(&indices, &code)?;
            println!("{} cells set to '{}'", cells, code);
            save(pm, &register)?;
        }

        Command::Weekday { weekday, code } => {
            let mut register = open_register(pm, rules, accept_warnings)?;
            let cells = register.assign_weekday(weekday, &code)?;
            println!("{} cells set to '{}' on {}", cells, code, weekday);
            save(pm, &register)?;
        }

        Command::Update {
            emp_id,
            name,
            gross,
            opening_cl,
            bonus,
            other_allowance,
            ot,
            other_deduction,
            epf_no,
            esi_no,
        } => {
            let update = EmployeeUpdate {
                name,
                gross,
                opening_cl,
                bonus,
                other_allowance,
                ot,
                other_deduction,
                epf_number: epf_no,
                esi_number: esi_no,
            };
            if update.is_empty() {
                bail!("Nothing to update; pass at least one field");
            }
            let mut register = open_register(pm, rules, accept_warnings)?;
            let record = register.update_employee(&emp_id, &update)?;
            print_slip(record);
            save(pm, &register)?;
        }

        Command::Remove { emp_id } => {
            let mut register = open_register(pm, rules, accept_warnings)?;
            let removed = register.delete_employee(&emp_id)?;
            println!("Removed {} ({})", removed.emp_id(), removed.profile.name);
            save(pm, &register)?;
        }

        Command::Show { emp_id } => {
            let register = open_register(pm, rules, accept_warnings)?;
            match emp_id {
                Some(emp_id) => {
                    let record = register
                        .employee(&emp_id)
                        .with_context(|| format!("Employee '{}' not found", emp_id))?;
                    print_slip(record);
                }
                None => print_register(register.dataset()),
            }
        }

        Command::Backups => {
            let backups = pm.list_backups()?;
            if backups.is_empty() {
                println!("No backups yet");
            }
            for backup in &backups {
                println!(
                    "{}  {}  {} bytes",
                    backup.key,
                    backup.created_at.format("%Y-%m-%d %H:%M:%S"),
                    backup.bytes
                );
            }
            let usage = pm.usage()?;
            println!(
                "Storage: {} of {} bytes ({:.1}%)",
                usage.used_bytes,
                usage.max_storage_bytes,
                usage.usage_ratio * 100.0
            );
        }

        Command::Restore { key } => {
            let dataset = pm.restore_backup(&key)?;
            println!("Restored {} with {} employees", dataset.month, dataset.employees.len());
        }

        Command::Clear => {
            if pm.clear()? {
                println!("Register cleared; backups kept");
            } else {
                println!("Nothing to clear");
            }
        }
    }
    Ok(())
}

// --- Helpers ---

fn open_register(
    pm: &mut PersistenceManager<FileStorage>,
    rules: SalaryRules,
    accept_warnings: bool,
) -> Result<PayrollRegister> {
    match pm.load()? {
        LoadOutcome::Loaded {
            dataset,
            migrated_from,
        } => {
            if let Some(version) = migrated_from {
                info!("Register upgraded from schema v{}", version);
            }
            Ok(PayrollRegister::new(dataset, rules)
                .context("Stored register cannot be recomputed")?
                .accept_warnings(accept_warnings))
        }
        LoadOutcome::NoData => bail!("No register found; start one with `payroll init <year> <month>`"),
        LoadOutcome::Rejected { reason } => bail!(
            "Stored register is unusable ({}). Restore a backup or run `payroll init --force`",
            reason
        ),
    }
}

fn save(pm: &mut PersistenceManager<FileStorage>, register: &PayrollRegister) -> Result<()> {
    let outcome = pm.save(register.dataset()).context("Changes were not saved")?;
    report_save(&outcome);
    Ok(())
}

fn report_save(outcome: &SaveOutcome) {
    if outcome.near_quota {
        warn!(
            "Storage is {:.0}% full; export and clear old registers soon",
            outcome.usage_ratio * 100.0
        );
    }
    if let Some(key) = &outcome.backup_key {
        println!("Backup written: {}", key);
    }
}

fn day_index(day: usize) -> Result<usize> {
    if day == 0 {
        bail!("Days are numbered from 1");
    }
    Ok(day - 1)
}

fn print_register(dataset: &Dataset) {
    println!("{} ({} employees)", dataset.month, dataset.employees.len());
    println!(
        "{:>4} {:<10} {:<20} {:>7} {:>10} {:>10} {:>10}",
        "S.No", "Emp ID", "Name", "Payable", "Earnings", "Deduction", "Net"
    );
    for e in &dataset.employees {
        println!(
            "{:>4} {:<10} {:<20} {:>7} {:>10} {:>10} {:>10}",
            e.sno,
            e.emp_id(),
            e.profile.name,
            e.summary.payable_days,
            e.salary.total_earnings,
            e.salary.total_deduction,
            e.salary.net_salary
        );
    }
    let totals = dataset.totals();
    println!(
        "{:>4} {:<10} {:<20} {:>7} {:>10} {:>10} {:>10}",
        "", "", "TOTAL", totals.payable_days, totals.total_earnings, totals.total_deduction, totals.net_salary
    );
}

fn print_slip(e: &EmployeeRecord) {
    let marks: Vec<&str> = e
        .attendance
        .marks()
        .iter()
        .map(|m| if m.as_str().is_empty() { "." } else { m.as_str() })
        .collect();
    println!("{} {} (gross {})", e.emp_id(), e.profile.name, e.profile.gross);
    println!("  attendance: {}", marks.join(" "));
    println!(
        "  present {} | CL {} | WO {} | PH {} | OD {} | LOP {} | payable {}",
        e.summary.present_days,
        e.summary.casual_leave,
        e.summary.week_off,
        e.summary.paid_holiday,
        e.summary.on_duty,
        e.summary.loss_of_pay,
        e.summary.payable_days
    );
    println!(
        "  earned {} = basic {} + DA {} + HRA {}; bonus {}, allowance {}, OT {}",
        e.salary.earned_gross,
        e.salary.basic,
        e.salary.da,
        e.salary.hra,
        e.profile.bonus,
        e.profile.other_allowance,
        e.profile.ot
    );
    println!(
        "  EPF {} | ESI {} | PT {} | other {} | deductions {}",
        e.salary.epf, e.salary.esi, e.salary.prof_tax, e.profile.other_deduction, e.salary.total_deduction
    );
    println!("  net salary {}", e.salary.net_salary);
}
