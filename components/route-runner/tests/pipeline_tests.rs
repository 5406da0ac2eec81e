mod common;

use common::Project;
use pretty_assertions::assert_eq;
use route_runner::cli::flags::parse_route_flags;
use route_runner::pipeline::run_routes;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn reader_all_to_writer_produces_fixed_output() {
    let project = Project::new();
    let config = project.write("routes.yaml", "from: ./reader-all\nto: ./writer\n");
    let resolver = project.resolver();

    let routes = resolver.routes_from_file(&config).await.unwrap();
    let summary = run_routes(routes, &CancellationToken::new()).await.unwrap();

    assert_eq!(summary.records_written, 2);
    assert_eq!(project.produced_files(), vec!["a.json.out", "beta-page.out"]);
    assert_eq!(
        project.produced("a.json.out"),
        "OUTPUT BEGIN --\n{\n    \"body\": \"first\",\n    \"source\": \"a.json\",\n    \"title\": \"Alpha\"\n}\nOUTPUT END ---"
    );
    assert_eq!(
        project.produced("beta-page.out"),
        "OUTPUT BEGIN --\n{\n    \"output\": \"beta-page\",\n    \"source\": \"b.json\",\n    \"title\": \"Beta\"\n}\nOUTPUT END ---"
    );
}

#[tokio::test]
async fn builtin_packages_with_controller_and_variables() {
    let project = Project::new();
    let out_dir = project.path("public");
    let config = project.write(
        "routes.yaml",
        &format!(
            r#"
- from:
    module: "@ves/dir-reader"
    args:
      dir: {data}
      extensions: [json]
  to:
    module: "@ves/file-writer"
    args:
      out_dir: {out}
      out_file$function: '|page| page.source + ".txt"'
      renderer$function: '|page| page.site + ": " + page.title'
  controller: "@ves/merge-variables"
  variables:
    site: Demo
"#,
            data = project.path("data").display(),
            out = out_dir.display(),
        ),
    );

    let routes = project.resolver().routes_from_file(&config).await.unwrap();
    run_routes(routes, &CancellationToken::new()).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(out_dir.join("a.json.txt")).unwrap(),
        "Demo: Alpha"
    );
    assert_eq!(
        std::fs::read_to_string(out_dir.join("b.json.txt")).unwrap(),
        "Demo: Beta"
    );
}

#[tokio::test]
async fn cli_flags_resolve_and_run() {
    let project = Project::new();
    let route = parse_route_flags(&[
        "--from.module",
        "./reader-file",
        "--from.args.file",
        "a.json",
        "--to",
        "./writer",
    ])
    .unwrap();

    let routes = project.resolver().routes_from_args(&route).await.unwrap();
    let summary = run_routes(routes, &CancellationToken::new()).await.unwrap();

    assert_eq!(summary.records_read, 1);
    assert_eq!(project.produced_files(), vec!["a.json.out"]);
}

#[tokio::test]
async fn script_controller_fans_out_and_skips() {
    let project = Project::new();
    project.write(
        "paginate.rhai",
        r#"
            fn paginate(page) {
                if page.title == "Beta" { return (); }
                [
                    #{ output: page.source + "-1", title: page.title },
                    #{ output: page.source + "-2", title: page.title }
                ]
            }
        "#,
    );
    let config = project.write(
        "routes.json",
        r#"{"from": "./reader-all", "to": "./writer", "controller": {"module": "./paginate.rhai", "export": "paginate"}}"#,
    );

    let routes = project.resolver().routes_from_file(&config).await.unwrap();
    let summary = run_routes(routes, &CancellationToken::new()).await.unwrap();

    assert_eq!(summary.records_skipped, 1);
    assert_eq!(summary.records_written, 2);
    assert_eq!(project.produced_files(), vec!["a.json-1.out", "a.json-2.out"]);
}
