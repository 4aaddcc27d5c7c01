//! Edge blocklist sync.
//!
//! Pushes CrowdSec decisions into Cloudflare so that malicious traffic is
//! stopped at the edge before it reaches the origin.
//!
//! # Surfaces
//!
//! - **IP list** - Account IP list referenced by firewall rules, fully replaced each run
//! - **KV** - One KV value holding a JSON array of banned addresses
//! - **WAF rule** - Expression of an existing rule, rewritten as `(ip.src in {...})`
//!
//! Every run is a single stateless pass: fetch decisions, normalize them,
//! keep the most severe ones that fit the target, verify the remote
//! resource is the one configured, then write (or, with `--dry-run`, only
//! report what would be written).
//!
//! # Example Configuration
//!
//! ```yaml
//! settings:
//!   account_id: "${CLOUDFLARE_ACCOUNT_ID}"
//!   api_token: "${CLOUDFLARE_API_TOKEN}"
//!
//! ip_list:
//!   list_id: "${CLOUDFLARE_LIST_ID}"
//!   list_name: "crowdsec-blocklist"
//!   max_items: 9900
//! ```

pub mod config;
pub mod edge;
pub mod error;
pub mod guard;
pub mod normalize;
pub mod plan;
pub mod prioritize;
pub mod source;
pub mod sync;

pub use config::Config;
pub use error::SyncError;
pub use plan::{Mode, Surface, SyncPlan, SyncResult};
pub use sync::Syncer;
