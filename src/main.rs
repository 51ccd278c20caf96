use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::error::Error;
use std::path;
use std::sync::Arc;

use ddld::logging::{init_tracing, LogQueue};
use ddld::utils::{shutdown_signal, Shutdown};
use ddld::{Config, Controller, LocalDirStore, RemoteStore};

///////////////////////
// Utility functions //
///////////////////////

/// Build the configuration: file and environment, then CLI flags on top
fn load_config(matches: &ArgMatches) -> Result<Config, Box<dyn Error>> {
	let explicit = matches.get_one::<String>("config").map(path::PathBuf::from);
	let data_dir = matches.get_one::<String>("data-dir").map(path::PathBuf::from);
	let mut config = Config::discover(explicit.as_deref(), data_dir.as_deref())?;

	if let Some(dir) = data_dir {
		config.data_dir = dir;
	}
	if let Some(dir) = matches.get_one::<String>("mirror") {
		config.mirror_root = Some(path::PathBuf::from(dir));
	}
	if let Some(dir) = matches.get_one::<String>("remote") {
		config.remote_root = Some(path::PathBuf::from(dir));
	}
	config.validate()?;
	Ok(config)
}

fn open_remote(config: &Config) -> Result<Arc<dyn RemoteStore>, Box<dyn Error>> {
	let root = config
		.remote_root
		.as_ref()
		.ok_or("No remote configured: pass --remote or set remoteRoot / DDLD_REMOTE_ROOT")?;
	if !root.is_dir() {
		return Err(format!("{} is not a directory", root.display()).into());
	}
	Ok(Arc::new(LocalDirStore::new(root.clone())))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn many(matches: &ArgMatches, name: &str) -> Vec<String> {
	matches.get_many::<String>(name).map(|v| v.cloned().collect()).unwrap_or_default()
}

fn one<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, Box<dyn Error>> {
	Ok(matches.get_one::<String>(name).ok_or(format!("{} argument required", name))?.as_str())
}

fn cli() -> Command {
	Command::new("ddld")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Szilard Hajba <szilu@symbion.hu>")
		.about("Drive download daemon")
		.subcommand_required(true)
		.arg(Arg::new("config").short('c').long("config").value_name("FILE").global(true).help("Config file"))
		.arg(Arg::new("data-dir").long("data-dir").value_name("DIR").global(true).help("State directory"))
		.arg(Arg::new("mirror").long("mirror").value_name("DIR").global(true).help("Mirror root"))
		.arg(
			Arg::new("remote")
				.short('r')
				.long("remote")
				.value_name("DIR")
				.global(true)
				.help("Directory served as the remote drive"),
		)
		.subcommand(
			Command::new("serve")
				.about("Refresh the given paths, then run until interrupted")
				.arg(Arg::new("path").action(ArgAction::Append).num_args(0..)),
		)
		.subcommand(
			Command::new("refresh")
				.about("Refresh remote subtrees into the cache")
				.arg(Arg::new("path").required(true).action(ArgAction::Append).num_args(1..)),
		)
		.subcommand(
			Command::new("search")
				.about("Search cached nodes by name (substring or glob)")
				.arg(Arg::new("pattern").required(true)),
		)
		.subcommand(
			Command::new("download")
				.about("Download a node into the mirror")
				.arg(Arg::new("id").required(true)),
		)
		.subcommand(
			Command::new("trash").about("Move a node to the remote trash").arg(Arg::new("id").required(true)),
		)
		.subcommand(
			Command::new("compare")
				.about("Group nodes by content")
				.arg(Arg::new("id").required(true).action(ArgAction::Append).num_args(1..)),
		)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = cli().get_matches();
	let config = load_config(&matches)?;

	let logs = Arc::new(LogQueue::new(config.recent_log_capacity));
	init_tracing(&config.log_level, config.log_file.as_deref(), Some(logs.clone()))?;

	let remote = open_remote(&config)?;
	let controller = Controller::open(config, remote)?.with_logs(logs);

	let outcome = run(&controller, &matches).await;
	controller.close().await;
	if let Some(signal) = outcome? {
		std::process::exit(signal.exit_code());
	}
	Ok(())
}

/// Run the subcommand; `serve` reports the signal that stopped it
async fn run(
	controller: &Controller,
	matches: &ArgMatches,
) -> Result<Option<Shutdown>, Box<dyn Error>> {
	match matches.subcommand() {
		Some(("serve", sub)) => {
			let paths = many(sub, "path");
			if !paths.is_empty() {
				print_json(&controller.refresh(paths.as_slice()).await)?;
			}
			let signal = shutdown_signal().await;
			ddld::logging::info!("Stopping on {:?}", signal);
			return Ok(Some(signal));
		}
		Some(("refresh", sub)) => {
			let paths = many(sub, "path");
			let result = controller.refresh(paths.as_slice()).await;
			print_json(&result)?;
			if !result.is_ok() {
				return Err("Some paths failed to refresh".into());
			}
		}
		Some(("search", sub)) => print_json(&controller.search(one(sub, "pattern")?)?)?,
		Some(("download", sub)) => print_json(&controller.download(one(sub, "id")?).await?)?,
		Some(("trash", sub)) => print_json(&controller.trash(one(sub, "id")?).await?)?,
		Some(("compare", sub)) => {
			let ids = many(sub, "id");
			print_json(&controller.compare(ids.as_slice()).await?)?
		}
		_ => return Err("Unknown subcommand".into()),
	}
	Ok(None)
}

// vim: ts=4
