//! # nginx-compose - declarative nginx configuration
//!
//! Sites, locations, rewrites and friends are declared as HCL blocks and rendered into a
//! tree of small nginx configuration fragments that are stitched together by `include`
//! wildcards.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `nginx-compose` works internally.
//!
//! ### Namespace paths
//!
//! Every directive and every block lives at a [path::NamespacePath], which mirrors nginx's
//! nested contexts:
//!
//! | scope               | path                                       |
//! |---------------------|--------------------------------------------|
//! | global              | `http/<leaf>`                              |
//! | site `foo`          | `http/site_foo/<leaf>`                     |
//! | location `root`     | `http/site_foo/location_root/<leaf>`       |
//!
//! The path is also where the fragment ends up on disk: `http/site_foo/listen` is written
//! to `nginx.conf.d/http/site_foo/listen.conf`.
//!
//! ### Nodes and documents
//!
//! - a [node::ParameterNode] renders a single `directive value;` line
//! - a [node::GroupNode] renders a block (`server { ... }`) whose only content is an
//!   `include <its directory>/*.conf;`, so everything below its path is pulled in
//!
//! Both end up in a [document::ConfigDocument], one per path. Raw documents can carry
//! literal content or point to an external source file, never both.
//!
//! **Example**
//!
//! ```hcl
//! site rspec {
//!   base_dir    = "/home/rspec/sites/rspec"
//!   server_name = "rspec.example.com"
//! }
//! ```
//!
//! | **path**                      | **kind**  | **renders**                                |
//! |-------------------------------|-----------|--------------------------------------------|
//! | `http/site_rspec`             | group     | `server { include .../site_rspec/*.conf; }` |
//! | `http/site_rspec/server_name` | parameter | `server_name rspec.example.com;`           |
//! | `http/site_rspec/listen`      | parameter | `listen 80;`                               |
//! | `http/site_rspec/root`        | parameter | `root /home/rspec/sites/rspec/htdocs;`     |
//!
//! ### Loading and parsing
//!
//! Declaration files are loaded into [hcl_documents::HclDocuments] (which remembers where
//! each block came from) and turned into typed [entity::Declaration]s by
//! [declarations::from_documents]. Attribute expressions are evaluated with [hcl::eval].
//!
//! ### Composition
//!
//! see [compose::Engine::compose]
//!
//! Each declaration is validated and expanded on its own. The first invalid declaration
//! aborts the run with a [error::CompositionError]. Two declarations claiming the same
//! path is an error as well, there is no "last one wins".
//!
//! ### Convergence
//!
//! see [apply::converge]
//!
//! The resulting [compose::Plan] is handed to an [apply::ResourceApplier]. Fragments whose
//! bytes did not change are left alone, fragments that are no longer declared are
//! purged. Any change to the configuration raises the [apply::ChangeSignal] so the
//! caller knows nginx needs a reload.
//!
pub mod apply;
pub mod compose;
pub mod declarations;
pub mod document;
pub mod entity;
pub mod error;
pub mod hcl_documents;
pub mod node;
pub mod path;
pub mod value;
