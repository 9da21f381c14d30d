use std::fs;

use pretty_assertions::assert_eq;
use tether_model::{Provider, RepositoryCatalog, ScopeId, TetherModelError};
use testresult::TestResult;

#[test]
fn it_loads_repositories_sorted_by_file_name() -> TestResult {
    let directory = tempfile::tempdir()?;
    fs::write(
        directory.path().join("b-service.yaml"),
        "name: svc-b\naccessPermissions:\n  aws:\n    account: 111\n",
    )?;
    fs::write(
        directory.path().join("a-service.yml"),
        "name: svc-a\naccessPermissions:\n  aws:\n    account: '111'\n",
    )?;
    fs::write(directory.path().join("README.md"), "not a repository")?;

    let catalog = RepositoryCatalog::load(directory.path())?;

    let names = catalog
        .iter()
        .map(|repository| repository.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["svc-a", "svc-b"]);

    let intent = catalog
        .get("svc-b")
        .and_then(|repository| repository.cloud_intent(Provider::Aws))
        .ok_or("missing intent")?;
    assert_eq!(intent.primary_scope, Some(ScopeId::from("111")));
    Ok(())
}

#[test]
fn it_rejects_duplicate_repository_names() -> TestResult {
    let directory = tempfile::tempdir()?;
    fs::write(directory.path().join("one.yaml"), "name: twin\n")?;
    fs::write(directory.path().join("two.yaml"), "name: twin\n")?;

    match RepositoryCatalog::load(directory.path()) {
        Err(TetherModelError::DuplicateRepository(name)) => assert_eq!(name, "twin"),
        other => panic!("expected a duplicate repository error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn it_names_the_file_that_failed_to_parse() -> TestResult {
    let directory = tempfile::tempdir()?;
    fs::write(directory.path().join("broken.yaml"), "description: no name\n")?;

    match RepositoryCatalog::load(directory.path()) {
        Err(TetherModelError::Repository { path, .. }) => {
            assert!(path.ends_with("broken.yaml"))
        }
        other => panic!("expected a repository parse error, got {other:?}"),
    }
    Ok(())
}
