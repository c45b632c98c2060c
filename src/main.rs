use clap::{Parser, Subcommand};
use dialoguer::console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use laradev::compose::{artisan, ProjectContext};
use laradev::config::{
    init_config, load_config, resolve_config_path, Config, MAX_TIMEOUT_SECS,
};
use laradev::error::AppError;
use laradev::health::probe;
use laradev::marker::{FileMarkerStore, MarkerStore};
use laradev::presets::{find_preset, run_preset, PRESETS};
use laradev::process::{diagnose, render_command, CommandRunner, Diagnosis, SystemRunner};
use laradev::project::{list_projects, normalize_projects_root};
use laradev::safety::SafetyContext;
use laradev::setup::{generate, GenerateOptions};
use laradev::workflow::{
    reset_database, start_environment, stop_environment, StartOptions, WorkflowResult,
    RESET_ACTION, STOP_ACTION,
};
use laradev::logging;
use serde::Serialize;
use serde_json::json;
use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "laradev", version, about = "Docker development environments for Laravel projects")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    /// Project directory (defaults to the current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List Laravel projects under a folder
    Projects {
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Generate docker-compose.yml, nginx/php config and .env defaults
    Generate {
        #[arg(long, default_value_t = false)]
        no_overwrite_compose: bool,
        #[arg(long, default_value_t = false)]
        no_env: bool,
        #[arg(long, default_value_t = false)]
        keep_compose_yaml: bool,
    },
    /// Start the environment
    Up {
        #[arg(long, default_value_t = false)]
        no_migrate: bool,
        #[arg(long, default_value_t = false)]
        sail: bool,
        #[arg(long, default_value_t = false)]
        no_wait: bool,
        #[arg(long)]
        health_service: Option<String>,
        /// Seconds to wait for the health service (1..=86400)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
        health_timeout: Option<u64>,
    },
    /// Stop the environment
    Down {
        #[arg(long, default_value_t = false)]
        yes: bool,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Rebuild the database with migrate:fresh
    ResetDb {
        #[arg(long, default_value_t = false)]
        seed: bool,
        #[arg(long, default_value_t = false)]
        yes: bool,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Run an artisan command in the app container
    Artisan {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Show a service's health status
    Status {
        #[arg(long)]
        service: Option<String>,
    },
    Preset {
        #[command(subcommand)]
        command: PresetCommand,
    },
    Doctor,
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PresetCommand {
    List,
    Run {
        key: String,
        #[arg(long, default_value_t = false)]
        yes: bool,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init,
    Show,
    Validate,
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_details: Option<Diagnosis>,
}

#[derive(Debug, Clone)]
struct Context {
    config_path: PathBuf,
    project: Option<PathBuf>,
    json: bool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let ctx = Context {
        config_path: resolve_config_path(cli.config.as_ref()),
        project: cli.project.clone(),
        json: cli.json,
    };
    let runner = SystemRunner;

    let result = match cli.command {
        Commands::Projects { root } => handle_projects(&ctx, root),
        Commands::Generate {
            no_overwrite_compose,
            no_env,
            keep_compose_yaml,
        } => handle_generate(
            &ctx,
            GenerateOptions {
                overwrite_compose: !no_overwrite_compose,
                update_env: !no_env,
                disable_compose_yaml: !keep_compose_yaml,
            },
        ),
        Commands::Up {
            no_migrate,
            sail,
            no_wait,
            health_service,
            health_timeout,
        } => handle_up(
            &ctx,
            &runner,
            no_migrate,
            sail,
            no_wait,
            health_service,
            health_timeout,
        ),
        Commands::Down { yes, force } => handle_down(&ctx, &runner, yes, force),
        Commands::ResetDb { seed, yes, force } => handle_reset_db(&ctx, &runner, seed, yes, force),
        Commands::Artisan { args } => handle_artisan(&ctx, &runner, &args),
        Commands::Status { service } => handle_status(&ctx, &runner, service),
        Commands::Preset { command } => handle_preset(&ctx, &runner, command),
        Commands::Doctor => handle_doctor(&ctx, &runner),
        Commands::Config { command } => handle_config(&ctx, command),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            if ctx.json {
                let payload = JsonResult::<serde_json::Value> {
                    ok: false,
                    result: None,
                    error: Some(err.to_string()),
                    error_details: None,
                };
                let _ = print_json(&payload);
            } else {
                eprintln!("{} {err}", style("error:").red().bold());
            }
            std::process::exit(1);
        }
    }
}

fn resolve_project_dir(ctx: &Context) -> Result<PathBuf, AppError> {
    let cwd = env::current_dir()?;
    let dir = match &ctx.project {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => cwd.join(path),
        None => cwd,
    };
    if !dir.is_dir() {
        return Err(AppError::Config(format!(
            "project directory does not exist: {}",
            dir.display()
        )));
    }
    Ok(dir)
}

fn project_context(ctx: &Context) -> Result<ProjectContext, AppError> {
    let config = load_config(&ctx.config_path)?;
    Ok(ProjectContext::new(resolve_project_dir(ctx)?, config))
}

/// Builds the safety context for `action`, prompting on a terminal when
/// neither `--yes` nor `--force` was given.
fn safety_context(
    ctx: &Context,
    project: &ProjectContext,
    action: &str,
    yes: bool,
    force: bool,
) -> Result<SafetyContext, AppError> {
    let confirmed = if yes || force {
        yes
    } else if !ctx.json && io::stdin().is_terminal() {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{action} for '{}'?", project.name()))
            .default(false)
            .interact()?
    } else {
        false
    };
    Ok(SafetyContext::new(project.root(), confirmed, force))
}

fn handle_projects(ctx: &Context, root: Option<PathBuf>) -> Result<bool, AppError> {
    let config = load_config(&ctx.config_path)?;
    let root = match root.or_else(|| config.projects.root_path()) {
        Some(root) => root,
        None => env::current_dir()?,
    };
    let root = normalize_projects_root(&root);
    if !root.is_dir() {
        return Err(AppError::Config(format!(
            "projects folder does not exist: {}",
            root.display()
        )));
    }
    let markers = FileMarkerStore;
    let projects: Vec<serde_json::Value> = list_projects(&root)?
        .iter()
        .map(|path| {
            json!({
                "name": path.file_name().map(|s| s.to_string_lossy().to_string()),
                "path": path,
                "mysql_initialized": markers.is_initialized(path),
            })
        })
        .collect();

    if ctx.json {
        output_json(json!({"root": root, "projects": projects}))?;
    } else if projects.is_empty() {
        println!("No Laravel projects found in {}", root.display());
    } else {
        for project in &projects {
            println!(
                "{}\t{}",
                project["name"].as_str().unwrap_or_default(),
                project["path"].as_str().unwrap_or_default()
            );
        }
    }
    Ok(true)
}

fn handle_generate(ctx: &Context, options: GenerateOptions) -> Result<bool, AppError> {
    let project = resolve_project_dir(ctx)?;
    let report = generate(&project, &options, &FileMarkerStore)?;
    if ctx.json {
        output_json(serde_json::to_value(&report)?)?;
    } else {
        for warning in &report.warnings {
            eprintln!("{} {warning}", style("warning:").yellow().bold());
        }
        for action in &report.actions {
            println!("{} {action}", style("✔").green());
        }
    }
    Ok(true)
}

#[allow(clippy::too_many_arguments)]
fn handle_up<R: CommandRunner>(
    ctx: &Context,
    runner: &R,
    no_migrate: bool,
    sail: bool,
    no_wait: bool,
    health_service: Option<String>,
    health_timeout: Option<u64>,
) -> Result<bool, AppError> {
    let project = project_context(ctx)?;
    let defaults = StartOptions::for_project(&project);
    let options = StartOptions {
        auto_migrate: !no_migrate,
        ensure_sail: sail,
        wait_for_health: !no_wait,
        health_service: health_service.unwrap_or(defaults.health_service.clone()),
        health_timeout: health_timeout
            .map(Duration::from_secs)
            .unwrap_or(defaults.health_timeout),
        ..defaults
    };
    let result = start_environment(&project, runner, &FileMarkerStore, &options);
    render_workflow(ctx, &result)
}

fn handle_down<R: CommandRunner>(
    ctx: &Context,
    runner: &R,
    yes: bool,
    force: bool,
) -> Result<bool, AppError> {
    let project = project_context(ctx)?;
    let safety = safety_context(ctx, &project, STOP_ACTION, yes, force)?;
    let result = stop_environment(&project, runner, &safety)?;
    render_workflow(ctx, &result)
}

fn handle_reset_db<R: CommandRunner>(
    ctx: &Context,
    runner: &R,
    seed: bool,
    yes: bool,
    force: bool,
) -> Result<bool, AppError> {
    let project = project_context(ctx)?;
    let safety = safety_context(ctx, &project, RESET_ACTION, yes, force)?;
    let result = reset_database(&project, runner, seed, &safety)?;
    render_workflow(ctx, &result)
}

fn handle_artisan<R: CommandRunner>(
    ctx: &Context,
    runner: &R,
    args: &[String],
) -> Result<bool, AppError> {
    let project = project_context(ctx)?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let result = artisan(&project, runner, &args);
    if ctx.json {
        print_json(&JsonResult {
            ok: result.ok,
            error: (!result.ok).then(|| format!("artisan exited with {}", result.exit_code)),
            error_details: diagnose(&result),
            result: Some(&result),
        })?;
    } else {
        if !result.stdout.is_empty() {
            println!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            eprintln!("{}", result.stderr);
        }
        print_hint(diagnose(&result));
    }
    Ok(result.ok)
}

fn handle_status<R: CommandRunner>(
    ctx: &Context,
    runner: &R,
    service: Option<String>,
) -> Result<bool, AppError> {
    let project = project_context(ctx)?;
    let service = service.unwrap_or_else(|| project.config.health.service.clone());
    let status = probe(&project, runner, &service);
    let initialized = FileMarkerStore.is_initialized(project.root());
    if ctx.json {
        output_json(json!({
            "project": project.name(),
            "service": service,
            "status": status,
            "mysql_initialized": initialized,
        }))?;
    } else {
        println!("{service}: {status}");
        if initialized {
            println!("mysql initialized: yes");
        }
    }
    Ok(true)
}

fn handle_preset<R: CommandRunner>(
    ctx: &Context,
    runner: &R,
    command: PresetCommand,
) -> Result<bool, AppError> {
    match command {
        PresetCommand::List => {
            if ctx.json {
                output_json(serde_json::to_value(PRESETS)?)?;
            } else {
                for preset in &PRESETS {
                    println!("{:<8} {} - {}", preset.key, preset.name, preset.description);
                }
            }
            Ok(true)
        }
        PresetCommand::Run { key, yes, force } => {
            let preset = find_preset(&key).ok_or_else(|| {
                let known: Vec<&str> = PRESETS.iter().map(|p| p.key).collect();
                AppError::Config(format!(
                    "unknown preset '{key}' (known: {})",
                    known.join(", ")
                ))
            })?;
            let project = project_context(ctx)?;
            let safety = if preset.action.is_destructive() {
                safety_context(ctx, &project, preset.name, yes, force)?
            } else {
                SafetyContext::new(project.root(), yes, force)
            };
            let result = run_preset(preset, &project, runner, &FileMarkerStore, &safety)?;
            render_workflow(ctx, &result)
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    id: &'static str,
    ok: bool,
    message: String,
}

fn handle_doctor<R: CommandRunner>(ctx: &Context, runner: &R) -> Result<bool, AppError> {
    let mut checks = Vec::new();
    let config = match load_config(&ctx.config_path) {
        Ok(config) => {
            checks.push(DoctorCheck {
                id: "config",
                ok: true,
                message: format!("config ok ({})", ctx.config_path.display()),
            });
            config
        }
        Err(err) => {
            checks.push(DoctorCheck {
                id: "config",
                ok: false,
                message: err.to_string(),
            });
            Config::default()
        }
    };

    let binary = config.docker.binary.as_str();
    let installed = which::which(binary).is_ok();
    checks.push(DoctorCheck {
        id: "docker_installed",
        ok: installed,
        message: if installed {
            format!("`{binary}` found on PATH")
        } else {
            format!("`{binary}` is not installed or not in PATH")
        },
    });

    if installed {
        let args = vec!["compose".to_string(), "version".to_string()];
        let cwd = env::current_dir()?;
        let result = runner.run(binary, &args, &cwd, config.docker.command_timeout());
        checks.push(DoctorCheck {
            id: "docker_compose",
            ok: result.ok,
            message: if result.ok {
                result.stdout.lines().next().unwrap_or("compose available").to_string()
            } else {
                format!(
                    "`{}` failed: {}",
                    render_command(binary, &args),
                    result.combined_output()
                )
            },
        });
    }

    let all_ok = checks.iter().all(|check| check.ok);
    if ctx.json {
        print_json(&JsonResult {
            ok: all_ok,
            result: Some(&checks),
            error: (!all_ok).then(|| "one or more checks failed".to_string()),
            error_details: None,
        })?;
    } else {
        for check in &checks {
            let mark = if check.ok {
                style("✔").green()
            } else {
                style("✖").red()
            };
            println!("{mark} {}: {}", check.id, check.message);
        }
    }
    Ok(all_ok)
}

fn handle_config(ctx: &Context, command: ConfigCommand) -> Result<bool, AppError> {
    match command {
        ConfigCommand::Init => {
            let created = init_config(&ctx.config_path)?;
            output(
                ctx,
                json!({"path": ctx.config_path, "created": created}),
                &if created {
                    format!("Wrote {}", ctx.config_path.display())
                } else {
                    format!("Config already exists at {}", ctx.config_path.display())
                },
            )?;
        }
        ConfigCommand::Show => {
            let config = load_config(&ctx.config_path)?;
            if ctx.json {
                output_json(serde_json::to_value(&config)?)?;
            } else {
                print!("{}", serde_yaml::to_string(&config)?);
            }
        }
        ConfigCommand::Validate => {
            load_config(&ctx.config_path)?;
            output(
                ctx,
                json!({"path": ctx.config_path, "valid": true}),
                &format!("{} is valid", ctx.config_path.display()),
            )?;
        }
    }
    Ok(true)
}

fn render_workflow(ctx: &Context, result: &WorkflowResult) -> Result<bool, AppError> {
    let diagnosis = result.result.as_ref().and_then(diagnose);
    if ctx.json {
        print_json(&JsonResult {
            ok: result.ok,
            result: Some(result),
            error: result.error.clone(),
            error_details: diagnosis,
        })?;
        return Ok(result.ok);
    }

    for step in &result.steps {
        println!("{} {step}", style("✔").green());
    }
    if let Some(error) = &result.error {
        eprintln!("{} {error}", style("✖").red().bold());
        if let Some(command) = &result.result {
            let output = command.combined_output();
            if !output.is_empty() {
                eprintln!("{output}");
            }
        }
        print_hint(diagnosis);
    }
    Ok(result.ok)
}

fn print_hint(diagnosis: Option<Diagnosis>) {
    if let Some(hint) = diagnosis.and_then(|d| d.hint) {
        eprintln!("{} {hint}", style("hint:").cyan());
    }
}

fn output(ctx: &Context, payload: serde_json::Value, human: &str) -> Result<(), AppError> {
    if ctx.json {
        output_json(payload)
    } else {
        println!("{human}");
        Ok(())
    }
}

fn output_json(payload: serde_json::Value) -> Result<(), AppError> {
    print_json(&JsonResult {
        ok: true,
        result: Some(payload),
        error: None,
        error_details: None,
    })
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn artisan_accepts_hyphenated_arguments() {
        let cli = Cli::try_parse_from(["laradev", "artisan", "migrate", "--force"]).unwrap();
        match cli.command {
            Commands::Artisan { args } => assert_eq!(args, vec!["migrate", "--force"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn health_timeout_is_range_checked() {
        for bad in ["0", "86401", "18446744073709551615"] {
            let err = Cli::try_parse_from(["laradev", "up", "--health-timeout", bad])
                .expect_err("out of range");
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
        let cli = Cli::try_parse_from(["laradev", "up", "--health-timeout", "120"]).unwrap();
        match cli.command {
            Commands::Up { health_timeout, .. } => assert_eq!(health_timeout, Some(120)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn yes_and_force_skip_the_prompt() {
        let ctx = Context {
            config_path: PathBuf::from("/nonexistent/config.yaml"),
            project: None,
            json: false,
        };
        let project = ProjectContext::new("/srv/shop", Config::default());
        let forced = safety_context(&ctx, &project, STOP_ACTION, false, true).unwrap();
        assert!(forced.force);
        assert!(!forced.confirmed);
        let confirmed = safety_context(&ctx, &project, STOP_ACTION, true, false).unwrap();
        assert!(confirmed.confirmed);
    }

    #[test]
    fn json_mode_never_prompts() {
        let ctx = Context {
            config_path: PathBuf::from("/nonexistent/config.yaml"),
            project: None,
            json: true,
        };
        let project = ProjectContext::new("/srv/shop", Config::default());
        let safety = safety_context(&ctx, &project, STOP_ACTION, false, false).unwrap();
        assert!(!safety.confirmed);
        assert!(!safety.force);
    }

    #[test]
    fn relative_project_resolves_against_cwd() {
        let ctx = Context {
            config_path: PathBuf::from("/nonexistent/config.yaml"),
            project: Some(PathBuf::from(".")),
            json: false,
        };
        let dir = resolve_project_dir(&ctx).unwrap();
        assert!(dir.is_dir());
        assert!(dir.is_absolute());
    }
}
