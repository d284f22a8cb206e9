//! Template rendering for plan artifacts
//!
//! Every plan renders into its own directory `<work_dir>/<plan_id>`:
//! - `hosts` - localhost entries plus one `ip name` line per node
//! - `multinode` - ansible inventory grouped by container runtime and role
//! - `globals.yml` - cluster-wide variables for the installer
//! - `<node>/id_rsa` - private key of every key-authenticated node
//!
//! Templates are compiled into the binary and rendered with minijinja in
//! strict mode, so a missing variable is an error instead of an empty string.

pub mod globals;
pub mod inventory;

use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;

pub use globals::Globals;
pub use inventory::{Inventory, KeyFile};

use crate::error::Result;

pub const HOSTS_FILE: &str = "hosts";
pub const INVENTORY_FILE: &str = "multinode";
pub const GLOBALS_FILE: &str = "globals.yml";
pub const KEY_FILE: &str = "id_rsa";

/// Where the installer container sees the plan directory
pub const CONFIG_MOUNT: &str = "/configs";

/// Embedded templates as (name, content) pairs
const TEMPLATES: &[(&str, &str)] = &[
    (HOSTS_FILE, include_str!("templates/hosts.j2")),
    (INVENTORY_FILE, include_str!("templates/multinode.j2")),
    (GLOBALS_FILE, include_str!("templates/globals.yml.j2")),
];

/// Directory a plan's artifacts are rendered into
pub fn plan_dir(work_dir: &Path, plan_id: i64) -> PathBuf {
    work_dir.join(plan_id.to_string())
}

/// Location of a node's private key inside the plan directory
pub fn key_path(plan_dir: &Path, node_name: &str) -> PathBuf {
    plan_dir.join(node_name).join(KEY_FILE)
}

#[derive(Serialize)]
struct HostEntry<'a> {
    ip: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct HostsContext<'a> {
    hosts: Vec<HostEntry<'a>>,
}

/// Renders the plan artifacts from the embedded templates
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);

        for &(name, content) in TEMPLATES {
            env.add_template(name, content)?;
            tracing::debug!("Loaded embedded template: {}", name);
        }

        Ok(Self { env })
    }

    /// Renders the hosts file for `(ip, name)` pairs in plan order
    pub fn render_hosts<'a, I>(&self, hosts: I) -> Result<String>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let ctx = HostsContext {
            hosts: hosts
                .into_iter()
                .map(|(ip, name)| HostEntry { ip, name })
                .collect(),
        };
        self.render(HOSTS_FILE, &ctx)
    }

    pub fn render_inventory(&self, inventory: &Inventory) -> Result<String> {
        self.render(INVENTORY_FILE, inventory)
    }

    pub fn render_globals(&self, globals: &Globals) -> Result<String> {
        self.render(GLOBALS_FILE, globals)
    }

    fn render<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }
}
