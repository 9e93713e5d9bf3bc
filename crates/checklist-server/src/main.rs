// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Checklist server authorization tooling.
//!
//! Loads the server configuration and binding metadata, opens the database,
//! and evaluates group-membership authorization for field requests supplied as
//! JSON. Also provisions groups and memberships.

use anyhow::Context;
use checklist_server_auth::{
	AuthzEngine, BindingRegistry, RequestIdentity, SchemaMetadata, ScopeId, SubjectId,
};
use checklist_server_config::{AuthzConfig, ServerConfig};
use checklist_server_db::{
	create_pool, run_migrations, MembershipRepository, MembershipStore, SqliteAccessorFactory,
	SqlitePool,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod request;
mod version;

use request::{CheckReport, CheckRequest};

/// Checklist server - group-scoped authorization for the checklist API.
#[derive(Parser, Debug)]
#[command(
	name = "checklist-server",
	about = "Checklist server authorization tooling",
	version
)]
struct Args {
	/// Config file (defaults to /etc/checklist/server.toml)
	#[arg(long, short, env = "CHECKLIST_SERVER_CONFIG", global = true)]
	config: Option<PathBuf>,

	/// Log output format (logs go to stderr)
	#[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
	log_format: LogFormat,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
	Text,
	Json,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
	/// Create or update the database schema
	Migrate,
	/// List the compiled scope bindings
	Bindings,
	/// Authorize the field requests in a JSON file ("-" for stdin)
	Check {
		#[arg(default_value = "-")]
		request: PathBuf,
	},
	/// Manage groups and memberships
	Group {
		#[command(subcommand)]
		action: GroupCommand,
	},
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
	/// Create a group
	Create { id: String, name: String },
	/// Add a user to a group
	AddMember { group: String, user: String },
	/// Remove a user from a group
	RemoveMember { group: String, user: String },
	/// Show a group
	Show { id: String },
	/// List a group's members
	Members { group: String },
	/// List the groups a user belongs to
	ForUser { user: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	let config = match &args.config {
		Some(path) => checklist_server_config::load_config_with_file(path)?,
		None => checklist_server_config::load_config()?,
	};

	init_tracing(&config, args.log_format);

	match args.command {
		Command::Version => {}
		Command::Migrate => {
			open_database(&config).await?;
			tracing::info!("schema up to date");
		}
		Command::Bindings => {
			let registry = load_registry(&config.authz)?;
			for binding in registry.iter_sorted() {
				println!(
					"{}\tscope_argument={}\tscope_entity={}",
					binding.applies_to, binding.scope_argument, binding.scope_entity
				);
			}
		}
		Command::Check { request } => {
			let report = check(&config, &request).await?;
			println!("{}", serde_json::to_string_pretty(&report)?);
		}
		Command::Group { action } => {
			let repo = MembershipRepository::new(open_database(&config).await?);
			run_group_command(&repo, action).await?;
		}
	}

	Ok(())
}

fn init_tracing(config: &ServerConfig, format: LogFormat) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());

	tracing_subscriber::registry()
		.with(filter)
		.with((format == LogFormat::Text).then(|| {
			tracing_subscriber::fmt::layer().with_writer(std::io::stderr)
		}))
		.with((format == LogFormat::Json).then(|| {
			tracing_subscriber::fmt::layer()
				.json()
				.with_writer(std::io::stderr)
		}))
		.init();
}

async fn open_database(config: &ServerConfig) -> anyhow::Result<SqlitePool> {
	let pool = create_pool(&config.database.url)
		.await
		.with_context(|| format!("opening database {}", config.database.url))?;
	run_migrations(&pool).await?;
	Ok(pool)
}

fn load_registry(config: &AuthzConfig) -> anyhow::Result<BindingRegistry> {
	let metadata = match &config.bindings_path {
		Some(path) => SchemaMetadata::load(path)?,
		None => {
			tracing::warn!("no bindings_path configured, no field is guarded");
			SchemaMetadata::default()
		}
	};

	Ok(BindingRegistry::from_metadata_with_defaults(
		&metadata,
		&config.default_scope_argument,
		&config.default_scope_entity,
	)?)
}

fn read_request(path: &Path) -> anyhow::Result<CheckRequest> {
	let content = if path == Path::new("-") {
		let mut buf = String::new();
		std::io::stdin()
			.read_to_string(&mut buf)
			.context("reading request from stdin")?;
		buf
	} else {
		std::fs::read_to_string(path)
			.with_context(|| format!("reading request {}", path.display()))?
	};
	serde_json::from_str(&content).context("parsing request JSON")
}

async fn check(config: &ServerConfig, path: &Path) -> anyhow::Result<CheckReport> {
	let request = read_request(path)?;
	let identity =
		RequestIdentity::from_bearer(&request.token).context("rejecting request credentials")?;

	let registry = load_registry(&config.authz)?;
	let pool = open_database(config).await?;
	let engine = AuthzEngine::new(Arc::new(registry), Arc::new(SqliteAccessorFactory::new(pool)))
		.with_enabled(config.authz.enabled);

	let fields: Vec<_> = request.fields.iter().map(|f| f.to_field_request()).collect();
	let decisions = engine.authorize_all(&identity, &fields).await;

	let report = CheckReport::build(&request.fields, &decisions);
	tracing::info!(
		subject_id = %identity.subject.id,
		fields = report.fields.len(),
		errors = report.errors.len(),
		"authorization check complete"
	);
	Ok(report)
}

async fn run_group_command(store: &dyn MembershipStore, action: GroupCommand) -> anyhow::Result<()> {
	match action {
		GroupCommand::Create { id, name } => {
			let group = store.create_group(&id.into(), &name).await?;
			println!("{}", serde_json::to_string(&group)?);
		}
		GroupCommand::AddMember { group, user } => {
			store.add_member(&group.into(), &user.into()).await?;
		}
		GroupCommand::RemoveMember { group, user } => {
			let (group, user) = (ScopeId::from(group), SubjectId::from(user));
			if !store.remove_member(&group, &user).await? {
				tracing::warn!(group_id = %group, user_id = %user, "no such membership");
			}
		}
		GroupCommand::Show { id } => {
			let id = ScopeId::from(id);
			let group = store
				.get_group(&id)
				.await?
				.with_context(|| format!("group {id} not found"))?;
			println!("{}", serde_json::to_string(&group)?);
		}
		GroupCommand::Members { group } => {
			for member in store.list_members(&group.into()).await? {
				println!("{member}");
			}
		}
		GroupCommand::ForUser { user } => {
			for group in store.list_groups_for_user(&user.into()).await? {
				println!("{}", serde_json::to_string(&group)?);
			}
		}
	}
	Ok(())
}
