//! Subcommand handlers

use anyhow::{Context as _, Result, anyhow, bail};
use ghkv_core::hooks::DEFAULT_EVENTS;
use ghkv_core::repo_admin::NewRepository;
use ghkv_core::{
    GhkvConfig, GitHubClient, GitHubRepository, HookConfig, HookManager, MemoryRepository,
    Provision, RecordStore, RepoPath,
};
use serde_json::Value;
use std::sync::Arc;

use crate::{ClassAction, HookAction, RecordAction, RepoAction, TableAction};

/// Resolved configuration plus the selected backend
pub struct Context {
    config: GhkvConfig,
    memory: bool,
}

impl Context {
    pub fn new(config: GhkvConfig, memory: bool) -> Self {
        Self { config, memory }
    }

    async fn store(&self) -> Result<RecordStore> {
        let branch = self.config.github.branch.clone();
        if self.memory {
            tracing::debug!("Using in-memory store on branch '{}'", branch);
            let repo = MemoryRepository::new().with_branch(&branch).await;
            return Ok(RecordStore::new(Arc::new(repo), branch));
        }
        RecordStore::connect(&self.config)
            .await
            .with_context(|| format!("failed to open repository '{}'", self.config.github.repository))
    }

    fn client(&self) -> Result<GitHubClient> {
        if self.memory {
            bail!("this command needs the GitHub backend; drop --memory");
        }
        Ok(GitHubClient::new(&self.config.github, self.config.retry.clone())?)
    }

    async fn repository(&self) -> Result<GitHubRepository> {
        let client = self.client()?;
        self.config.validate()?;
        client
            .open_repository(self.config.github.owner.as_deref(), &self.config.github.repository)
            .await
            .with_context(|| format!("failed to open repository '{}'", self.config.github.repository))
    }
}

/// Parse a record value: JSON when it parses, a plain string otherwise
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn provision_label(provision: Provision) -> &'static str {
    match provision {
        Provision::Created => "created",
        Provision::AlreadyExists => "already exists",
    }
}

pub async fn class(ctx: &Context, action: ClassAction) -> Result<()> {
    let store = ctx.store().await?;
    match action {
        ClassAction::Create { name } => {
            let provision = store.create_class(&name).await?;
            println!("Class '{}' {}", name, provision_label(provision));
        }
        ClassAction::Remove { name } => {
            let report = store.remove_class(&name).await?;
            println!("Removed class '{}' ({} file(s))", name, report.files.len());
        }
        ClassAction::List => {
            for name in store.list_classes().await? {
                println!("{}", name);
            }
        }
        ClassAction::Rename { name, new_name } => {
            let report = store.rename_class(&name, &new_name).await?;
            println!(
                "Renamed class '{}' to '{}' ({} file(s))",
                name,
                new_name,
                report.files.len()
            );
        }
    }
    Ok(())
}

pub async fn table(ctx: &Context, action: TableAction) -> Result<()> {
    let store = ctx.store().await?;
    match action {
        TableAction::Create { class, name } => {
            let provision = store.create_table(&name, &class).await?;
            println!("Table '{}/{}' {}", class, name, provision_label(provision));
        }
        TableAction::Remove { class, name } => {
            store.remove_table(&class, &name).await?;
            println!("Removed table '{}/{}'", class, name);
        }
        TableAction::List { class } => {
            for name in store.list_tables(&class).await? {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

pub async fn record(ctx: &Context, action: RecordAction) -> Result<()> {
    let store = ctx.store().await?;
    match action {
        RecordAction::Insert {
            class,
            table,
            name,
            value,
        } => {
            store.insert_data(&table, &class, &name, parse_value(&value)).await?;
            println!("Inserted '{}' into '{}/{}'", name, class, table);
        }
        RecordAction::Update {
            class,
            table,
            name,
            value,
        } => {
            store.update_data(&table, &class, &name, parse_value(&value)).await?;
            println!("Updated '{}' in '{}/{}'", name, class, table);
        }
        RecordAction::Remove { class, table, name } => {
            store.remove_data(&table, &class, &name).await?;
            println!("Removed '{}' from '{}/{}'", name, class, table);
        }
        RecordAction::Get { class, table } => {
            let records = store.get_data(&table, &class).await?;
            println!("{}", serde_json::to_string_pretty(&Value::Object(records))?);
        }
        RecordAction::Search { class, table, name } => {
            match store.search_data(&table, &class, &name).await? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => return Err(anyhow!("no record '{}' in '{}/{}'", name, class, table)),
            }
        }
    }
    Ok(())
}

pub async fn mv(ctx: &Context, src: &str, dst: &str) -> Result<()> {
    let store = ctx.store().await?;
    let src = RepoPath::new(src)?;
    let dst = RepoPath::new(dst)?;
    let report = store
        .file(src.clone())
        .move_to(&dst)
        .await
        .with_context(|| format!("failed to move '{}' to '{}'", src, dst))?;
    println!(
        "Moved '{}' to '{}' ({} file(s), {} commit(s))",
        src,
        dst,
        report.files.len(),
        report.commits
    );
    Ok(())
}

pub async fn repo(ctx: &Context, action: RepoAction) -> Result<()> {
    match action {
        RepoAction::Info => {
            let info = ctx.repository().await?.info().await?;
            println!("Repository:     {}", info.full_name);
            println!("URL:            {}", info.html_url);
            println!("Visibility:     {}", if info.private { "private" } else { "public" });
            println!("Default branch: {}", info.default_branch);
            println!(
                "Created:        {}",
                info.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(description) = info.description.filter(|d| !d.is_empty()) {
                println!("Description:    {}", description);
            }
        }
        RepoAction::Create {
            name,
            public,
            description,
        } => {
            let request = NewRepository {
                private: !public,
                description,
                ..NewRepository::private(&name)
            };
            let repo = ctx.client()?.create_repository(&request).await?;
            println!("Created repository '{}'", repo.full_name());
        }
        RepoAction::Delete { yes } => {
            let repo = ctx.repository().await?;
            if !yes {
                bail!(
                    "refusing to delete '{}' without --yes",
                    repo.full_name()
                );
            }
            let name = repo.full_name();
            repo.delete().await?;
            println!("Deleted repository '{}'", name);
        }
        RepoAction::Rename { new_name } => {
            let mut repo = ctx.repository().await?;
            let old = repo.full_name();
            repo.rename(&new_name).await?;
            println!("Renamed repository '{}' to '{}'", old, repo.full_name());
        }
    }
    Ok(())
}

pub async fn hook(ctx: &Context, action: HookAction) -> Result<()> {
    let repo = ctx.repository().await?;
    let hooks = HookManager::new(&repo);
    match action {
        HookAction::List => {
            for hook in hooks.list().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    hook.id,
                    if hook.active { "active" } else { "inactive" },
                    hook.config.url,
                    hook.events.join(",")
                );
            }
        }
        HookAction::Create {
            url,
            events,
            secret,
            inactive,
        } => {
            let config = HookConfig {
                secret,
                ..HookConfig::json(&url)
            };
            let events: Vec<&str> = events.iter().map(String::as_str).collect();
            let hook = hooks.create(&config, &events, !inactive).await?;
            let subscribed = if hook.events.is_empty() {
                DEFAULT_EVENTS.join(",")
            } else {
                hook.events.join(",")
            };
            println!("Created webhook {} ({})", hook.id, subscribed);
        }
        HookAction::Delete { id } => {
            hooks.delete(id).await?;
            println!("Deleted webhook {}", id);
        }
    }
    Ok(())
}
