use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use internal::{
    config::EntityBases,
    entity::DirectoryEntity,
    manager::{Directory, EntityManager},
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

#[derive(Subcommand, Debug)]
pub enum EntityCommand {
    /// inetOrgPerson entries
    People {
        #[command(subcommand)]
        action: PeopleAction,
    },
    /// Login and service accounts
    Users {
        #[command(subcommand)]
        action: UserAction,
    },
    /// groupOfNames and groupOfUniqueNames entries
    Groups {
        #[command(subcommand)]
        action: GroupAction,
    },
    /// Organizational units
    Ous {
        #[command(subcommand)]
        action: CommonAction,
    },
}

#[derive(Args, Debug, Clone)]
pub struct Window {
    /// Base relative to the root base, defaults to the configured one
    #[arg(short, long)]
    pub base: Option<String>,

    /// First entry of the sorted window, 1-based
    #[arg(short, long, default_value_t = 0)]
    pub start: u32,

    /// Last entry of the sorted window, inclusive
    #[arg(short, long, default_value_t = 0)]
    pub end: u32,

    /// Print whole entries instead of DNs
    #[arg(short, long, default_value_t = false)]
    pub full: bool,
}

#[derive(Subcommand, Debug)]
pub enum CommonAction {
    /// List entries, optionally windowed
    List(Window),
    Get {
        dn: String,
    },
    /// Create or update the entry from a JSON file
    Put {
        dn: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    Delete {
        dn: String,
    },
    /// Creation and modification times
    Timestamps {
        dn: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum PeopleAction {
    #[command(flatten)]
    Common(CommonAction),
    /// Search people with an LDAP filter
    Search {
        filter: String,
    },
    /// Groups the person belongs to
    MemberOf {
        dn: String,
    },
    /// People belonging to the group
    InGroup {
        group_dn: String,
    },
    Authenticate {
        dn: String,
        #[arg(short, long)]
        password: String,
        /// Skip the existence check
        #[arg(long, default_value_t = false)]
        direct: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserAction {
    #[command(flatten)]
    Common(CommonAction),
    Authenticate {
        dn: String,
        #[arg(short, long)]
        password: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum GroupAction {
    #[command(flatten)]
    Common(CommonAction),
    Members {
        dn: String,
    },
    IsMember {
        dn: String,
        member: String,
    },
    /// Replace the member list
    SetMembers {
        dn: String,
        members: Vec<String>,
    },
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn authenticated(dn: &str, ok: bool) -> Result<()> {
    print(&json!({ "dn": dn, "authenticated": ok }))?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn common<E>(manager: &EntityManager<E>, default_base: &str, action: CommonAction) -> Result<()>
where
    E: DirectoryEntity + Serialize + DeserializeOwned,
{
    match action {
        CommonAction::List(window) => {
            let base = window.base.as_deref().unwrap_or(default_base);
            if window.full {
                print(&manager.list_entities(base, window.start, window.end).await?)
            } else {
                print(&manager.list(base, window.start, window.end).await?)
            }
        }
        CommonAction::Get { dn } => print(&manager.get(&dn).await?),
        CommonAction::Put { dn, file } => {
            let content = std::fs::read(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let entity: E = serde_json::from_slice(&content)?;
            let outcome = manager.save(&dn, entity).await?;
            print(&json!({ "dn": dn, "outcome": outcome }))
        }
        CommonAction::Delete { dn } => {
            manager.delete(&dn).await?;
            print(&json!({ "dn": dn, "deleted": true }))
        }
        CommonAction::Timestamps { dn } => {
            let timestamps = manager.queries().get_timestamps(&dn).await?;
            print(&json!({
                "dn": dn,
                "created": timestamps.created.map(|t| t.to_rfc3339()),
                "modified": timestamps.modified.map(|t| t.to_rfc3339()),
            }))
        }
    }
}

pub async fn run(directory: &Directory, bases: &EntityBases, command: EntityCommand) -> Result<()> {
    match command {
        EntityCommand::People { action } => {
            let people = directory.people();
            match action {
                PeopleAction::Common(action) => common(&*people, &bases.people, action).await,
                PeopleAction::Search { filter } => print(&people.search(&filter).await?),
                PeopleAction::MemberOf { dn } => print(&people.member_of(&dn).await?),
                PeopleAction::InGroup { group_dn } => print(&people.in_group(&group_dn).await?),
                PeopleAction::Authenticate {
                    dn,
                    password,
                    direct,
                } => {
                    let ok = if direct {
                        people.authenticate_direct(&dn, &password).await
                    } else {
                        people.authenticate(&dn, &password).await?
                    };
                    authenticated(&dn, ok)
                }
            }
        }
        EntityCommand::Users { action } => {
            let users = directory.users();
            match action {
                UserAction::Common(action) => common(&*users, &bases.users, action).await,
                UserAction::Authenticate { dn, password } => {
                    let ok = users.authenticate(&dn, &password).await?;
                    authenticated(&dn, ok)
                }
            }
        }
        EntityCommand::Groups { action } => {
            let groups = directory.groups();
            match action {
                GroupAction::Common(action) => common(&*groups, &bases.groups, action).await,
                GroupAction::Members { dn } => print(&groups.members(&dn).await?),
                GroupAction::IsMember { dn, member } => {
                    let is_member = groups.is_member(&dn, &member).await?;
                    print(&json!({ "dn": dn, "member": member, "is_member": is_member }))
                }
                GroupAction::SetMembers { dn, members } => {
                    groups.set_members(&dn, members).await?;
                    print(&groups.members(&dn).await?)
                }
            }
        }
        EntityCommand::Ous { action } => common(&directory.ous(), &bases.ous, action).await,
    }
}
