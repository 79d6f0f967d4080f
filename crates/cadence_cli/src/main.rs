use cadence_cli::cli::{
    Cli, Command, DetailArgs, ListCommand, collect_config_overrides, parse_optional_date,
};
use cadence_core::advance::{Advancement, RolloverReport};
use cadence_core::clock::clock_from_env;
use cadence_core::config::{
    Config, Palette, load_config_with_fallback, merge_overrides, palette_for_theme,
};
use cadence_core::error::AppError;
use cadence_core::model::rule::weekday_name;
use cadence_core::model::{Task, TaskStatus};
use cadence_core::occurrence::weekday_number;
use cadence_core::series::{TaskRole, role};
use cadence_core::task_api::{self, NewTask, TaskEdit};
use clap::{CommandFactory, Parser};
use std::io::{self, BufRead};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use time::Date;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "CADENCE_LOG";

struct Output {
    json: bool,
    palette: Palette,
    today: Date,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "TITLE")]
    title: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "DUE")]
    due: String,
    #[tabled(rename = "REPEATS")]
    repeats: String,
}

fn role_label(task: &Task) -> &'static str {
    match role(task) {
        TaskRole::Template => "template",
        TaskRole::Instance => "instance",
        TaskRole::Plain => "plain",
    }
}

fn status_text(task: &Task, today: Date) -> String {
    if task_api::task_overdue(task, today) {
        format!("{} (overdue)", task.status)
    } else {
        task.status.to_string()
    }
}

fn due_text(date: Option<Date>) -> String {
    date.map(|due| due.to_string()).unwrap_or_else(|| "-".to_string())
}

fn task_row(task: &Task, today: Date) -> TaskRow {
    TaskRow {
        id: task.id.clone(),
        title: task.title.clone(),
        status: status_text(task, today),
        due: due_text(task.due_date),
        repeats: task
            .active_rule()
            .map(|rule| rule.describe())
            .unwrap_or_else(|| "-".to_string()),
    }
}

fn print_tasks_plain(out: &Output, tasks: &[Task]) {
    if tasks.is_empty() {
        println!("{}", out.palette.mutedize("No tasks."));
        return;
    }
    let rows: Vec<TaskRow> = tasks.iter().map(|task| task_row(task, out.today)).collect();
    let mut table = Table::new(rows);
    table.with(Style::psql());
    println!("{table}");
}

fn task_json(task: &Task, today: Date) -> Result<serde_json::Value, AppError> {
    let mut value =
        serde_json::to_value(task).map_err(|err| AppError::invalid_data(err.to_string()))?;
    if let Some(object) = value.as_object_mut() {
        object.insert("role".into(), role_label(task).into());
        object.insert("overdue".into(), task_api::task_overdue(task, today).into());
    }
    Ok(value)
}

fn optional_task_json(task: Option<&Task>, today: Date) -> Result<serde_json::Value, AppError> {
    task.map(|task| task_json(task, today))
        .transpose()
        .map(|value| value.unwrap_or(serde_json::Value::Null))
}

fn tasks_json(tasks: &[Task], today: Date) -> Result<serde_json::Value, AppError> {
    tasks
        .iter()
        .map(|task| task_json(task, today))
        .collect::<Result<Vec<_>, _>>()
        .map(serde_json::Value::Array)
}

fn advancement_json(outcome: &Advancement, today: Date) -> Result<serde_json::Value, AppError> {
    Ok(serde_json::json!({
        "updated": task_json(&outcome.updated, today)?,
        "template": optional_task_json(outcome.template.as_ref(), today)?,
        "new_instance": optional_task_json(outcome.new_instance.as_ref(), today)?,
        "exhausted": outcome.exhausted,
        "parent_child_logic_executed": outcome.parent_child_logic_executed,
    }))
}

fn print_task_details(out: &Output, task: &Task) {
    println!("{}", out.palette.accentize(&task.title));
    println!("  id:        {}", task.id);
    println!("  role:      {}", role_label(task));
    println!("  status:    {}", status_text(task, out.today));
    println!("  due:       {}", due_text(task.due_date));
    println!("  created:   {}", task.created_at);
    if let Some(completed_at) = task.completed_at.as_deref() {
        println!("  completed: {completed_at}");
    }
    if let Some(rule) = task.active_rule() {
        println!("  repeats:   {}", rule.describe());
    }
    if let Some(parent) = task.recurring_parent_id.as_deref() {
        println!("  template:  {parent}");
    }
    if let Some(project) = task.project.as_deref() {
        println!("  project:   {project}");
    }
    if !task.tags.is_empty() {
        println!("  tags:      {}", task.tags.join(", "));
    }
    if let Some(priority) = task.priority {
        println!("  priority:  {priority}");
    }
    if let Some(note) = task.note.as_deref() {
        println!("  note:      {note}");
    }
    for entry in &task.completion_history {
        let message = entry.message.as_deref().unwrap_or("-");
        println!(
            "  {} {} ({})",
            out.palette.mutedize("history:"),
            message,
            entry.completed_at
        );
    }
}

fn print_advancement(out: &Output, verb: &str, outcome: &Advancement) -> Result<(), AppError> {
    if out.json {
        println!("{}", advancement_json(outcome, out.today)?);
        return Ok(());
    }

    println!(
        "{verb} task: {} ({})",
        out.palette.accentize(&outcome.updated.title),
        outcome.updated.id
    );
    if let Some(next) = outcome.new_instance.as_ref() {
        println!("Next occurrence: {} due {}", next.id, due_text(next.due_date));
    } else if outcome.exhausted {
        println!("{}", out.palette.mutedize("Series finished: no further occurrences"));
    } else if outcome.updated.recurring_parent_id.is_none()
        && outcome.updated.active_rule().is_some()
        && outcome.updated.is_open()
    {
        println!("Next due: {}", due_text(outcome.updated.due_date));
    }
    Ok(())
}

fn print_rollover(out: &Output, report: &RolloverReport, force: bool) -> Result<(), AppError> {
    if out.json {
        let advanced = report
            .advanced
            .iter()
            .map(|outcome| advancement_json(outcome, out.today))
            .collect::<Result<Vec<_>, _>>()?;
        println!(
            "{}",
            serde_json::json!({
                "overdue": tasks_json(&report.overdue, out.today)?,
                "advanced": advanced,
            })
        );
        return Ok(());
    }

    println!("{} overdue occurrence(s)", report.overdue.len());
    if !report.overdue.is_empty() {
        print_tasks_plain(out, &report.overdue);
    }
    if force {
        println!("Moved {} occurrence(s) forward", report.advanced.len());
    } else if !report.overdue.is_empty() {
        println!("{}", out.palette.mutedize("Run with --force to move them forward"));
    }
    Ok(())
}

fn new_task_details(details: &DetailArgs) -> Result<NewTask, AppError> {
    Ok(NewTask {
        project: details.project.clone(),
        tags: details.tags.clone(),
        priority: details.priority()?,
        note: details.note.clone(),
        ..NewTask::default()
    })
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn split_command_line(line: &str) -> Result<Vec<String>, AppError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in line.chars() {
        if escape {
            if ch != '"' && ch != '\\' {
                current.push('\\');
            }
            current.push(ch);
            escape = false;
            continue;
        }

        if in_quotes && ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }

        if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(ch);
    }

    if in_quotes {
        return Err(AppError::invalid_input("unterminated quote in command"));
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}

fn print_help() {
    let mut cmd = Cli::command();
    let help = cmd.render_help();
    println!("{help}");
}

/// File config merged with `--config-override` flags. A broken config file
/// is reported and defaults are used.
fn effective_config(raw_overrides: &[String]) -> Result<Config, AppError> {
    let loaded = load_config_with_fallback();
    if let Some(err) = loaded.error.as_ref() {
        eprintln!("WARNING: {err}");
    }
    let overrides = collect_config_overrides(raw_overrides)?;
    Ok(merge_overrides(&loaded.config, &overrides))
}

fn run_command(cli: Cli) -> Result<(), AppError> {
    debug!(command = ?cli.command, "running command");
    let config = effective_config(&cli.config_override)?;
    let out = Output {
        json: cli.json,
        palette: palette_for_theme(config.theme.as_deref()),
        today: clock_from_env()?.today(),
    };

    match cli.command {
        Command::Add {
            title,
            due,
            rule,
            details,
        } => {
            let title = match title {
                Some(value) if !value.trim().is_empty() => value,
                _ => return Err(AppError::invalid_input("title is required")),
            };

            let new_task = NewTask {
                title,
                due_date: parse_optional_date(due.as_deref())?,
                recurrence: rule.to_rule()?,
                ..new_task_details(&details)?
            };
            let task = task_api::add_task(new_task)?;
            if out.json {
                println!("{}", task_json(&task, out.today)?);
            } else {
                println!("Added task: {} ({})", out.palette.accentize(&task.title), task.id);
                if let Some(rule) = task.active_rule() {
                    println!("Repeats {}, first due {}", rule.describe(), due_text(task.due_date));
                }
            }
        }
        Command::Show { id } => {
            let task = task_api::get_task(&id)?;
            if out.json {
                println!("{}", task_json(&task, out.today)?);
            } else {
                print_task_details(&out, &task);
            }
        }
        Command::Edit {
            id,
            new_title,
            due,
            details,
        } => {
            let edit = TaskEdit {
                title: new_title,
                due_date: parse_optional_date(due.as_deref())?,
                project: details.project.clone(),
                tags: (!details.tags.is_empty()).then(|| details.tags.clone()),
                priority: details.priority()?,
                note: details.note.clone(),
            };
            let task = task_api::edit_task(&id, edit)?;
            if out.json {
                println!("{}", task_json(&task, out.today)?);
            } else {
                println!("Updated task: {} ({})", out.palette.accentize(&task.title), task.id);
            }
        }
        Command::Delete { id } => {
            let task = task_api::delete_task(&id)?;
            if out.json {
                println!("{}", task_json(&task, out.today)?);
            } else {
                println!("Deleted task: {} ({})", task.title, task.id);
            }
        }
        Command::Status {
            id,
            status,
            message,
        } => {
            let status: TaskStatus = status.parse()?;
            let outcome = task_api::set_status(&id, status, message.as_deref())?;
            print_advancement(&out, "Updated", &outcome)?;
        }
        Command::Done {
            id,
            message,
            message_flag,
        } => {
            let message = message_flag.or(message);
            let outcome = task_api::complete_task(&id, message.as_deref())?;
            print_advancement(&out, "Completed", &outcome)?;
        }
        Command::Skip { id } => {
            let outcome = task_api::skip_task(&id)?;
            print_advancement(&out, "Skipped", &outcome)?;
        }
        Command::Repeat {
            id,
            rule,
            no_until,
            from_due,
        } => {
            let edit = rule.to_edit(no_until, from_due)?;
            let outcome = task_api::edit_recurrence(&id, edit)?;
            if out.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "template": task_json(&outcome.template, out.today)?,
                        "redirected": outcome.redirected,
                        "refresh_instance_ids": outcome.refresh_instance_ids,
                    })
                );
            } else {
                let description = outcome
                    .template
                    .active_rule()
                    .map(|rule| rule.describe())
                    .unwrap_or_else(|| "does not repeat".to_string());
                println!(
                    "Updated recurrence on {} ({}): {description}",
                    out.palette.accentize(&outcome.template.title),
                    outcome.template.id
                );
                if outcome.redirected {
                    println!("{}", out.palette.mutedize(&format!("Applied to template of {id}")));
                }
            }
        }
        Command::Preview { id, count, from } => {
            let count = count.unwrap_or(config.preview_count);
            let dates =
                task_api::preview_iterations(&id, count, parse_optional_date(from.as_deref())?)?;
            if out.json {
                let rendered: Vec<String> = dates.iter().map(Date::to_string).collect();
                println!("{}", serde_json::json!(rendered));
            } else if dates.is_empty() {
                println!("{}", out.palette.mutedize("No upcoming occurrences."));
            } else {
                for date in dates {
                    println!("{date} {}", weekday_name(weekday_number(date)));
                }
            }
        }
        Command::Series { id } => {
            let series = task_api::list_series(&id)?;
            if out.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "template": task_json(&series.template, out.today)?,
                        "instances": tasks_json(&series.instances, out.today)?,
                    })
                );
            } else {
                print_task_details(&out, &series.template);
                print_tasks_plain(&out, &series.instances);
            }
        }
        Command::Rollover { force } => {
            let report = task_api::rollover(force)?;
            print_rollover(&out, &report, force)?;
        }
        Command::List { list } => {
            let tasks = match list {
                ListCommand::Today => task_api::list_today()?,
                ListCommand::Backlog => task_api::list_backlog()?,
            };
            if out.json {
                println!("{}", tasks_json(&tasks, out.today)?);
            } else {
                print_tasks_plain(&out, &tasks);
            }
        }
    }

    Ok(())
}

fn run_interactive() -> Result<(), AppError> {
    let mut input = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();

    loop {
        input.clear();
        let bytes = stdin_lock.read_line(&mut input)?;

        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line == "help" || line == "?" {
            print_help();
            continue;
        }

        let args = match split_command_line(line) {
            Ok(args) => args,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                continue;
            }
        };

        if args.is_empty() {
            continue;
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("cadence".to_string());
        argv.extend(args);

        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(err) => {
                eprintln!("ERROR: {}", normalize_parse_error(err));
                continue;
            }
        };

        if let Err(err) = run_command(cli) {
            eprintln!("ERROR: {}", err);
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_tracing();

    let mut args = std::env::args_os();
    args.next();
    if args.next().is_none() {
        if let Err(err) = run_interactive() {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
        return;
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) {
                let _ = err.print();
                return;
            }
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    if let Err(err) = run_command(cli) {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
