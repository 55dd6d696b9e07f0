//! Convergence tests
//!
//! The in-memory applier covers the change signal and purging, the filesystem applier
//! runs against a temporary directory.
use nginx_compose::apply::{converge, FsApplier, MemoryApplier, PendingAction, Platform};
use nginx_compose::compose::{Engine, Layout, Plan};
use nginx_compose::hcl_documents;
use std::path::Path;

fn plan(layout: Layout, documents: nginx_compose::hcl_documents::HclDocuments) -> Plan {
    let declarations =
        nginx_compose::declarations::from_documents(&documents).expect("declarations must parse");
    Engine::new(layout)
        .compose(&declarations)
        .expect("composition must succeed")
}

const DECLARATIONS: &str = r#"
server {}

site rspec {
    base_dir    = "/home/rspec/sites/rspec"
    server_name = "rspec.example.com"
}

gzip {}
"#;

mod memory {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn signal_only_when_something_changed() {
        let plan = plan(Layout::default(), hcl_documents!(DECLARATIONS));
        let mut applier = MemoryApplier::default();

        assert!(converge(&plan, &mut applier).unwrap().is_raised());
        assert!(!converge(&plan, &mut applier).unwrap().is_raised());
    }

    #[test]
    fn documents_are_written_below_conf_dir() {
        let plan = plan(Layout::default(), hcl_documents!(DECLARATIONS));
        let mut applier = MemoryApplier::default();
        converge(&plan, &mut applier).unwrap();

        let listen = applier
            .read("/etc/nginx/nginx.conf.d/http/site_rspec/listen.conf")
            .unwrap();
        assert!(listen.ends_with("\n    listen 80;\n"));

        let wrapper = applier
            .read("/etc/nginx/nginx.conf.d/http/site_rspec.conf")
            .unwrap();
        assert!(wrapper.contains("include /etc/nginx/nginx.conf.d/http/site_rspec/*.conf;"));

        let http = applier.read("/etc/nginx/nginx.conf.d/http.conf").unwrap();
        assert!(http.contains("\nhttp {\n"));

        assert!(applier.read("/etc/nginx/nginx.conf").is_some());
        assert!(applier.read("/etc/nginx/nginx.conf.d/README").is_some());
        assert_eq!(applier.packages, ["nginx"]);
        assert!(applier.log_rotations.contains_key("nginx-rspec"));
    }

    #[test]
    fn undeclared_fragments_are_purged() {
        let mut applier = MemoryApplier::default();
        let full = plan(Layout::default(), hcl_documents!(DECLARATIONS));
        converge(&full, &mut applier).unwrap();
        assert!(applier.read("/etc/nginx/nginx.conf.d/http/gzip.conf").is_some());

        let without_gzip = plan(
            Layout::default(),
            hcl_documents!(&DECLARATIONS.replace("gzip {}", "")),
        );
        let signal = converge(&without_gzip, &mut applier).unwrap();

        assert!(signal.is_raised());
        assert!(applier.read("/etc/nginx/nginx.conf.d/http/gzip.conf").is_none());
        assert!(applier
            .read("/etc/nginx/nginx.conf.d/http/site_rspec/listen.conf")
            .is_some());
    }

    #[test]
    fn removed_site_takes_its_directory_along() {
        let mut applier = MemoryApplier::default();
        converge(
            &plan(Layout::default(), hcl_documents!(DECLARATIONS)),
            &mut applier,
        )
        .unwrap();

        converge(
            &plan(Layout::default(), hcl_documents!("server {}")),
            &mut applier,
        )
        .unwrap();

        let leftovers: Vec<_> = applier
            .entries
            .keys()
            .filter(|path| path.to_string_lossy().contains("site_rspec"))
            .collect();
        assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
    }
}

mod fs {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: std::path::PathBuf,
        logrotate_dir: std::path::PathBuf,
        source: std::path::PathBuf,
        declarations: String,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nginx");
        let logrotate_dir = dir.path().join("logrotate.d");
        let source = dir.path().join("upstream.conf");
        std::fs::write(&source, "upstream app { server 127.0.0.1:8080; }\n").unwrap();

        let declarations = format!(
            r#"
            server {{}}

            site rspec {{
                base_dir    = "{base_dir}"
                server_name = "rspec.example.com"
                user        = "fred"
            }}

            config "http/upstream_app" {{
                source = "{source}"
            }}
            "#,
            base_dir = dir.path().join("sites/rspec").display(),
            source = source.display(),
        );

        Fixture {
            _dir: dir,
            root,
            logrotate_dir,
            source,
            declarations,
        }
    }

    fn apply(fixture: &Fixture) -> (bool, FsApplier) {
        let plan = plan(
            Layout::new(&fixture.root),
            hcl_documents!(&fixture.declarations),
        );
        let mut applier = FsApplier::new(Platform::Debian, &fixture.logrotate_dir);
        let signal = converge(&plan, &mut applier).unwrap();
        (signal.is_raised(), applier)
    }

    fn read(path: impl AsRef<Path>) -> String {
        std::fs::read_to_string(path.as_ref())
            .unwrap_or_else(|err| panic!("{}: {err}", path.as_ref().display()))
    }

    #[test]
    fn writes_the_tree() {
        let fixture = fixture();
        let (changed, _) = apply(&fixture);
        assert!(changed);

        let conf_dir = fixture.root.join("nginx.conf.d");
        assert!(read(fixture.root.join("nginx.conf")).contains(&format!(
            "include {};",
            conf_dir.join("*.conf").display()
        )));
        assert!(conf_dir.join("README").is_file());
        assert!(read(conf_dir.join("http/site_rspec/server_name.conf"))
            .ends_with("    server_name rspec.example.com;\n"));
        assert!(fixture.source.parent().unwrap().join("sites/rspec/logs").is_dir());

        let logrotate = read(fixture.logrotate_dir.join("nginx-rspec"));
        assert!(logrotate.contains("create 640 fred root"));
    }

    #[test]
    fn source_documents_are_copied_verbatim() {
        let fixture = fixture();
        apply(&fixture);

        assert_eq!(
            read(fixture.root.join("nginx.conf.d/http/upstream_app.conf")),
            read(&fixture.source)
        );
    }

    #[test]
    fn second_run_changes_nothing() {
        let fixture = fixture();
        apply(&fixture);

        let (changed, _) = apply(&fixture);
        assert!(!changed);
    }

    #[test]
    fn stale_entries_are_purged() {
        let fixture = fixture();
        apply(&fixture);

        let http = fixture.root.join("nginx.conf.d/http");
        std::fs::write(http.join("stale.conf"), "gzip on;\n").unwrap();
        std::fs::create_dir(http.join("site_gone")).unwrap();
        std::fs::write(http.join("site_gone/listen.conf"), "listen 80;\n").unwrap();
        // not below a managed directory
        std::fs::write(fixture.root.join("mime.types"), "types {}\n").unwrap();

        let (changed, _) = apply(&fixture);

        assert!(changed);
        assert!(!http.join("stale.conf").exists());
        assert!(!http.join("site_gone").exists());
        assert!(http.join("site_rspec/listen.conf").is_file());
        assert!(fixture.root.join("mime.types").is_file());
    }

    #[test]
    fn packages_and_services_are_pending() {
        let fixture = fixture();
        let (_, applier) = apply(&fixture);

        assert_eq!(
            applier.pending(),
            [
                PendingAction::InstallPackage {
                    package: "nginx-full".to_string()
                },
                PendingAction::Service {
                    service: "nginx".to_string(),
                    reload_command: "/usr/sbin/invoke-rc.d nginx reload".to_string()
                },
            ]
        );
    }
}
