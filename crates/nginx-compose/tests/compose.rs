//! Composition tests
//!
//! Declarations are written as HCL, parsed and composed the same way the cli does.
use nginx_compose::compose::{Engine, Layout, Plan};
use nginx_compose::document::FileContents;
use nginx_compose::error::CompositionError;
use nginx_compose::hcl_documents;
use pretty_assertions::assert_eq;
use std::path::PathBuf;

fn compose(documents: nginx_compose::hcl_documents::HclDocuments) -> Result<Plan, CompositionError> {
    let declarations =
        nginx_compose::declarations::from_documents(&documents).expect("declarations must parse");
    Engine::new(Layout::default()).compose(&declarations)
}

fn compose_ok(source: &str) -> Plan {
    compose(hcl_documents!(source)).expect("composition must succeed")
}

fn compose_err(source: &str) -> String {
    compose(hcl_documents!(source))
        .expect_err("composition must fail")
        .to_string()
}

/// `(directive, value)` of a parameter
fn param(plan: &Plan, path: &str) -> (String, String) {
    let node = plan
        .parameter(path)
        .unwrap_or_else(|| panic!("no parameter at {path}"));
    (node.directive.clone(), node.value.clone())
}

fn rendered(plan: &Plan, path: &str) -> String {
    match plan.document(path).map(|document| document.render()) {
        Some(FileContents::Inline(contents)) => contents,
        other => panic!("no inline document at {path}: {other:?}"),
    }
}

const SITE: &str = r#"
site rspec {
    base_dir    = "/home/rspec/sites/rspec"
    server_name = "rspec.example.com"
"#;

fn site(extra: &str) -> String {
    format!("{SITE}{extra}\n}}")
}

mod site {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn requires_base_dir_first() {
        assert_eq!(
            compose_err("site rspec {}"),
            "must pass base_dir to site \"rspec\""
        );
        assert_eq!(
            compose_err(r#"site rspec { server_name = "example.com" }"#),
            "must pass base_dir to site \"rspec\""
        );
    }

    #[test]
    fn requires_server_name() {
        assert_eq!(
            compose_err(r#"site rspec { base_dir = "/home/rspec/sites/rspec" }"#),
            "must pass server_name to site \"rspec\""
        );
    }

    #[test]
    fn required_parameters() {
        let plan = compose_ok(&site(""));

        assert_eq!(plan.group("http/site_rspec").unwrap().context, "server");
        assert_eq!(
            param(&plan, "http/site_rspec/server_name").1,
            "rspec.example.com"
        );
        assert_eq!(
            param(&plan, "http/site_rspec/error_log").1,
            "/home/rspec/sites/rspec/logs/error.log info"
        );
        assert_eq!(
            param(&plan, "http/site_rspec/access_log").1,
            "/home/rspec/sites/rspec/logs/access.log combined"
        );
        assert_eq!(param(&plan, "http/site_rspec/listen").1, "80");
        assert_eq!(
            param(&plan, "http/site_rspec/root").1,
            "/home/rspec/sites/rspec/htdocs"
        );
    }

    #[test]
    fn no_ssl_without_cert_and_key() {
        let plan = compose_ok(&site(""));
        let ssl: Vec<_> = plan
            .parameters
            .keys()
            .filter(|path| path.leaf().contains("ssl"))
            .collect();
        assert!(ssl.is_empty(), "unexpected ssl parameters: {ssl:?}");
    }

    #[test]
    fn logs_directory_and_rotation() {
        let plan = compose_ok(&site(""));

        let logs = &plan.directories[0];
        assert_eq!(logs.path, PathBuf::from("/home/rspec/sites/rspec/logs"));
        assert_eq!(logs.mode, 0o755);
        assert_eq!((logs.owner.as_str(), logs.group.as_str()), ("root", "root"));

        let rotation = &plan.log_rotations[0];
        assert_eq!(rotation.tag, "nginx-rspec");
        assert_eq!(rotation.glob, "/home/rspec/sites/rspec/logs/*.log");
        assert_eq!(rotation.count, 90);
        assert_eq!(rotation.create_mode, 0o640);
    }

    #[test]
    fn custom_user() {
        let plan = compose_ok(&site(
            r#"user = "fred"
            group = "fred""#,
        ));

        assert_eq!(plan.directories[0].owner, "fred");
        assert_eq!(plan.directories[0].group, "fred");
        assert_eq!(plan.log_rotations[0].owner, "fred");
    }

    #[test]
    fn alt_names_as_array_or_string() {
        let from_array = compose_ok(&site(
            r#"alt_names = ["foo.example.com", "bar.example.com"]"#,
        ));
        let from_string = compose_ok(&site(r#"alt_names = "foo.example.com bar.example.com""#));

        for plan in [from_array, from_string] {
            assert_eq!(
                param(&plan, "http/site_rspec/server_name").1,
                "rspec.example.com"
            );
            assert_eq!(
                param(&plan, "http/site_rspec/server_alt_names"),
                (
                    "server_name".to_string(),
                    "foo.example.com bar.example.com".to_string()
                )
            );
        }
    }

    #[test]
    fn default_server() {
        let plan = compose_ok(&site("default = true"));
        assert_eq!(param(&plan, "http/site_rspec/listen").1, "80 default");
    }

    #[test]
    fn incomplete_ssl() {
        assert_eq!(
            compose_err(&site(r#"ssl_cert = "x""#)),
            "must specify both ssl_cert and ssl_key in site \"rspec\" when ssl_cert is set"
        );
        assert_eq!(
            compose_err(&site(r#"ssl_key = "y""#)),
            "must specify both ssl_cert and ssl_key in site \"rspec\" when ssl_key is set"
        );
        assert_eq!(
            compose_err(&site(r#"ssl_ip = "192.0.2.42""#)),
            "must specify both ssl_cert and ssl_key in site \"rspec\" when ssl_ip is set"
        );
    }

    #[test]
    fn ssl() {
        let plan = compose_ok(&site(
            r#"ssl_cert = "x"
            ssl_key = "y""#,
        ));

        assert_eq!(
            param(&plan, "http/site_rspec/listen_ssl"),
            ("listen".to_string(), "443 ssl".to_string())
        );
        assert_eq!(param(&plan, "http/site_rspec/ssl_certificate").1, "x");
        assert_eq!(param(&plan, "http/site_rspec/ssl_certificate_key").1, "y");
        assert_eq!(param(&plan, "http/site_rspec/listen").1, "80");
    }

    #[test]
    fn ssl_ip_and_default() {
        let plan = compose_ok(&site(
            r#"ssl_cert = "x"
            ssl_key = "y"
            ssl_ip = "192.0.2.42"
            ssl_default = true"#,
        ));

        assert_eq!(
            param(&plan, "http/site_rspec/listen_ssl").1,
            "192.0.2.42:443 ssl default"
        );
    }

    #[test]
    fn ssl_redirect_requires_ssl() {
        assert_eq!(
            compose_err(&site("ssl_redirect = true")),
            "must pass ssl_cert and ssl_key to site \"rspec\" when ssl_redirect => true"
        );
    }

    #[test]
    fn ssl_redirect() {
        let plan = compose_ok(&site(
            r#"ssl_redirect = true
            ssl_cert = "x"
            ssl_key = "y""#,
        ));

        assert!(plan.parameter("http/site_rspec/listen").is_none());
        assert_eq!(
            plan.group("http/site_sslredir_rspec").unwrap().context,
            "server"
        );
        assert_eq!(param(&plan, "http/site_sslredir_rspec/listen").1, "80");
        assert_eq!(
            param(&plan, "http/site_sslredir_rspec/server_name").1,
            "rspec.example.com"
        );
        assert_eq!(
            param(&plan, "http/site_sslredir_rspec/root").1,
            "/usr/share/empty"
        );
        assert_eq!(
            param(&plan, "http/site_sslredir_rspec/ssl_redirect"),
            (
                "rewrite".to_string(),
                "^(.*)$ https://rspec.example.com$1 permanent".to_string()
            )
        );
    }

    #[test]
    fn hsts_requires_ssl_redirect() {
        assert_eq!(
            compose_err(&site("hsts = true")),
            "hsts can only be enabled together with ssl_redirect in site \"rspec\""
        );
        assert_eq!(
            compose_err(&site(
                r#"hsts = true
                ssl_cert = "x"
                ssl_key = "y""#
            )),
            "hsts can only be enabled together with ssl_redirect in site \"rspec\""
        );
    }

    #[test]
    fn hsts() {
        let redirect = r#"ssl_redirect = true
            ssl_cert = "x"
            ssl_key = "y"
            "#;

        let plan = compose_ok(&site(&format!("{redirect}hsts = 12345")));
        assert!(rendered(&plan, "http/site_rspec/add_header_hsts").contains(
            "\n    add_header Strict-Transport-Security \"max_age=12345; includeSubDomains\";\n"
        ));
        assert!(plan
            .document("http/site_sslredir_rspec/add_header_hsts")
            .is_none());

        let plan = compose_ok(&site(&format!(
            "{redirect}hsts = true\nhsts_include_subdomains = false"
        )));
        assert!(rendered(&plan, "http/site_rspec/add_header_hsts")
            .contains("\"max_age=31622400\";"));
    }

    #[test]
    fn wrapper_document() {
        let plan = compose_ok(&site(""));

        insta::assert_snapshot!(rendered(&plan, "http/site_rspec"), @r###"
        # THIS FILE IS AUTOMATICALLY GENERATED BY NGINX-COMPOSE
        # Local changes will be overwritten. Edit the declarations instead.

        server {
            include /etc/nginx/nginx.conf.d/http/site_rspec/*.conf;
        }
        "###);
    }

    #[test]
    fn parameter_document() {
        let plan = compose_ok(&site(""));

        insta::assert_snapshot!(rendered(&plan, "http/site_rspec/listen"), @r###"
        # THIS FILE IS AUTOMATICALLY GENERATED BY NGINX-COMPOSE
        # Local changes will be overwritten. Edit the declarations instead.

            listen 80;
        "###);
    }
}

mod location {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn requires_site_then_path() {
        assert_eq!(
            compose_err("location rspec {}"),
            "must pass site to location \"rspec\""
        );
        assert_eq!(
            compose_err(r#"location rspec { site = "mysite" }"#),
            "must pass path to location \"rspec\""
        );
    }

    #[test]
    fn creates_group_in_site() {
        for title in ["rspec", "some/funny/little/rspec"] {
            let plan = compose_ok(&format!(
                r#"location "{title}" {{
                    site = "mysite"
                    path = "~ ^/s3kr1t/(.*)$"
                }}"#
            ));

            assert_eq!(
                plan.group("http/site_mysite/location_rspec")
                    .unwrap()
                    .context,
                "location ~ ^/s3kr1t/(.*)$"
            );
        }
    }
}

mod rewrite {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn required_fields_in_order() {
        assert_eq!(
            compose_err("rewrite myrewrite {}"),
            "must pass from to rewrite \"myrewrite\""
        );
        assert_eq!(
            compose_err(r#"rewrite myrewrite { from = "^(.*)$" }"#),
            "must pass to to rewrite \"myrewrite\""
        );
        assert_eq!(
            compose_err(
                r#"rewrite myrewrite {
                    from = "^(.*)$"
                    to   = "https://example.com$1"
                }"#
            ),
            "must pass site to rewrite \"myrewrite\""
        );
    }

    fn rewrite(title: &str, extra: &str) -> Plan {
        compose_ok(&format!(
            r#"rewrite "{title}" {{
                from = "^(.*)$"
                to   = "https://example.com$1"
                site = "foo"
                {extra}
            }}"#
        ))
    }

    #[test]
    fn temporary() {
        let plan = rewrite("myrewrite", "");
        assert_eq!(
            param(&plan, "http/site_foo/myrewrite"),
            (
                "rewrite".to_string(),
                "^(.*)$ https://example.com$1".to_string()
            )
        );
    }

    #[test]
    fn in_location() {
        let plan = rewrite("myrewrite", r#"location = "root""#);
        assert_eq!(
            param(&plan, "http/site_foo/location_root/myrewrite").1,
            "^(.*)$ https://example.com$1"
        );
    }

    #[test]
    fn modifiers() {
        let plan = rewrite("myrewrite", "permanent = true");
        assert_eq!(
            param(&plan, "http/site_foo/myrewrite").1,
            "^(.*)$ https://example.com$1 permanent"
        );

        let plan = rewrite("myrewrite", "last = true");
        assert_eq!(
            param(&plan, "http/site_foo/myrewrite").1,
            "^(.*)$ https://example.com$1 last"
        );
    }

    #[test]
    fn last_and_permanent_conflict() {
        let err = compose(hcl_documents!(
            r#"rewrite myrewrite {
                from      = "^(.*)$"
                to        = "https://example.com$1"
                site      = "foo"
                last      = true
                permanent = true
            }"#
        ))
        .unwrap_err();

        assert!(matches!(err, CompositionError::ConflictingModifiers { .. }));
        assert_eq!(
            err.to_string(),
            "no more than one of last or permanent can be specified in rewrite \"myrewrite\""
        );
    }

    #[test]
    fn compound_title() {
        let plan = rewrite("example.com/myrewrite", "");
        assert!(plan.parameter("http/site_foo/myrewrite").is_some());
    }
}

mod fastcgi {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn required_fields_in_order() {
        assert_eq!(
            compose_err("fastcgi rspec {}"),
            "must pass site to fastcgi \"rspec\""
        );
        assert_eq!(
            compose_err(r#"fastcgi rspec { site = "example" }"#),
            "must pass location to fastcgi \"rspec\""
        );
        assert_eq!(
            compose_err(
                r#"fastcgi rspec {
                    site     = "example"
                    location = "root"
                }"#
            ),
            "must pass target to fastcgi \"rspec\""
        );
    }

    #[test]
    fn params_and_pass() {
        let plan = compose_ok(
            r#"fastcgi rspec {
                site     = "example"
                location = "root"
                target   = "unix:/var/run/example.sock"
            }"#,
        );

        for (name, source) in nginx_compose::compose::FASTCGI_PARAMS {
            assert_eq!(
                param(
                    &plan,
                    &format!("http/site_example/location_root/fastcgi_param_{name}")
                ),
                ("fastcgi_param".to_string(), format!("{name} {source}"))
            );
        }
        assert_eq!(
            param(&plan, "http/site_example/location_root/fastcgi_param_GATEWAY_INTERFACE").1,
            "GATEWAY_INTERFACE CGI/1.1"
        );
        assert_eq!(
            param(&plan, "http/site_example/location_root/fastcgi_pass").1,
            "unix:/var/run/example.sock"
        );
    }
}

mod toggles {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn gzip() {
        let plan = compose_ok("gzip {}");
        assert_eq!(param(&plan, "http/gzip").1, "on");

        let plan = compose_ok(r#"gzip rspec { site = "faff" }"#);
        assert_eq!(param(&plan, "http/site_faff/gzip").1, "on");
    }

    #[test]
    fn ssl_hardened() {
        let plan = compose_ok("ssl_hardened {}");
        assert_eq!(param(&plan, "http/ssl_prefer_server_ciphers").1, "on");

        let plan = compose_ok(r#"ssl_hardened rspec { site = "faff" }"#);
        assert_eq!(
            param(&plan, "http/site_faff/ssl_prefer_server_ciphers").1,
            "on"
        );
    }
}

mod error_page {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scopes() {
        let plan = compose_ok(
            r#"error_page rspec {
                code = 404
                dest = "/404.html"
            }"#,
        );
        assert_eq!(
            param(&plan, "http/error_page_404"),
            ("error_page".to_string(), "404 /404.html".to_string())
        );

        let plan = compose_ok(
            r#"error_page rspec {
                code = "404"
                dest = "/404.html"
                site = "faff"
            }"#,
        );
        assert_eq!(param(&plan, "http/site_faff/error_page_404").1, "404 /404.html");

        let plan = compose_ok(
            r#"error_page rspec {
                code     = "404"
                dest     = "/404.html"
                site     = "faff"
                location = "root"
            }"#,
        );
        assert_eq!(
            param(&plan, "http/site_faff/location_root/error_page_404").1,
            "404 /404.html"
        );
    }

    #[test]
    fn location_without_site() {
        assert_eq!(
            compose_err(
                r#"error_page rspec {
                    code     = "404"
                    dest     = "/404.html"
                    location = "root"
                }"#
            ),
            "must provide a site when providing a location in error_page \"rspec\""
        );
    }
}

mod raw {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parameter() {
        let plan = compose_ok(r#"parameter xyzzy { value = "faffenheim" }"#);
        assert!(rendered(&plan, "xyzzy").ends_with("\n    xyzzy faffenheim;\n"));

        let plan = compose_ok(
            r#"parameter "foo/bar/wombat/xyzzy" {
                value = "faffenheim"
                param = "blargle"
            }"#,
        );
        let document = rendered(&plan, "foo/bar/wombat/xyzzy");
        assert!(document.starts_with("# THIS FILE IS AUTOMATICALLY GENERATED BY NGINX-COMPOSE"));
        assert!(document.ends_with("\n    blargle faffenheim;\n"));
    }

    #[test]
    fn group() {
        let plan = compose_ok(r#"group xyzzy { context = "faffenheim" }"#);
        let document = rendered(&plan, "xyzzy");

        assert!(document.contains("\nfaffenheim {\n"));
        assert!(document.contains("\n    include /etc/nginx/nginx.conf.d/xyzzy/*.conf;\n"));
    }

    #[test]
    fn config_needs_exactly_one_input() {
        assert_eq!(
            compose_err("config noopts {}"),
            "must pass exactly one of source or content to config \"noopts\""
        );
        assert_eq!(
            compose_err(
                r#"config bothopts {
                    source  = "/x"
                    content = "y"
                }"#
            ),
            "must pass exactly one of source or content to config \"bothopts\""
        );
    }

    #[test]
    fn config_source() {
        let plan = compose_ok(r#"config source { source = "/srv/x.conf" }"#);
        assert_eq!(
            plan.document("source").unwrap().render(),
            FileContents::Source(PathBuf::from("/srv/x.conf"))
        );
    }
}

#[test]
fn duplicate_paths() {
    let err = compose_err(
        r#"
        gzip one { site = "faff" }
        parameter "http/site_faff/gzip" { value = "off" }
        "#,
    );
    assert_eq!(
        err,
        "http/site_faff/gzip is declared by both gzip \"one\" and parameter \"http/site_faff/gzip\""
    );
}

#[test]
fn fragment_file_names_are_reserved() {
    let err = compose(hcl_documents!(
        r#"
        parameter "http/x" { value = "on" }
        group "http/x.conf" { context = "server" }
        "#
    ))
    .unwrap_err();

    assert!(matches!(err, CompositionError::InvalidPath { .. }));
    assert_eq!(err.to_string(), "unusable path in group \"http/x.conf\"");

    let err = compose_err(r#"group README { context = "server" }"#);
    assert_eq!(err, "unusable path in group \"README\"");
}

#[test]
fn composition_is_deterministic() {
    let source = format!(
        "{}\ngzip {{}}\nlocation root {{\n site = \"rspec\"\n path = \"/\"\n}}",
        site("")
    );

    let first = compose_ok(&source);
    let second = compose_ok(&source);

    assert_eq!(first.documents, second.documents);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
