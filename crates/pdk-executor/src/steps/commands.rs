//! Pure argv construction for the non-script step kinds (SPEC_FULL.md §4.3).
//!
//! Building a command line never depends on where it eventually runs, so
//! this logic lives once and is shared by both the container and host step
//! executor families instead of being duplicated per family.

use pdk_core::pipeline::Step;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepCommandError {
    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    #[error("unsupported dotnet command: {0}")]
    UnsupportedDotNetCommand(String),

    #[error("unsupported npm command: {0}")]
    UnsupportedNpmCommand(String),

    #[error("npm 'run' requires a non-empty 'script' input")]
    MissingNpmScript,

    #[error("unsupported docker command: {0}")]
    UnsupportedDockerCommand(String),
}

impl From<StepCommandError> for pdk_core::Error {
    fn from(err: StepCommandError) -> Self {
        pdk_core::Error::InvalidInput(err.to_string())
    }
}

/// One or more argv sequences to run in order; checkout may need a
/// clone/pull followed by a checkout of a specific ref.
pub fn checkout_commands(step: &Step, workspace_has_repo: bool) -> Vec<Vec<String>> {
    let repository = step
        .with_input("repository")
        .filter(|r| !r.is_empty() && *r != "self");
    let git_ref = step
        .with_input("ref")
        .or_else(|| step.with_input("branch"))
        .or_else(|| step.with_input("tag"));

    let mut commands = Vec::new();
    if let Some(url) = repository {
        if workspace_has_repo {
            commands.push(vec!["git".to_string(), "pull".to_string()]);
        } else {
            commands.push(vec![
                "git".to_string(),
                "clone".to_string(),
                url.to_string(),
                ".".to_string(),
            ]);
        }
    }
    if let Some(r) = git_ref {
        if repository.is_some() {
            commands.push(vec!["git".to_string(), "checkout".to_string(), r.to_string()]);
        }
    }
    commands
}

/// `dotnet` command line. `projects` is already expanded by the caller
/// (container family via `find`, host family via `walkdir`+`globset`); an
/// empty slice means "let dotnet pick up the ambient project/solution".
pub fn dotnet_command(step: &Step, projects: &[String]) -> Result<Vec<String>, StepCommandError> {
    let command = step.with_input("command").unwrap_or("build");
    if !matches!(
        command,
        "restore" | "build" | "test" | "publish" | "run" | "pack" | "clean"
    ) {
        return Err(StepCommandError::UnsupportedDotNetCommand(command.to_string()));
    }

    let mut argv = vec!["dotnet".to_string(), command.to_string()];
    argv.extend(projects.iter().cloned());

    let supports_configuration = matches!(command, "build" | "test" | "publish" | "pack" | "run");
    if supports_configuration {
        if let Some(configuration) = step.with_input("configuration").filter(|c| !c.is_empty()) {
            argv.push("--configuration".to_string());
            argv.push(configuration.to_string());
        }
    }

    let supports_output = matches!(command, "publish" | "pack");
    if supports_output {
        if let Some(output) = step.with_input("outputPath").filter(|o| !o.is_empty()) {
            argv.push("--output".to_string());
            argv.push(output.to_string());
        }
    }

    if let Some(arguments) = step.with_input("arguments").filter(|a| !a.is_empty()) {
        argv.extend(arguments.split_whitespace().map(str::to_string));
    }

    Ok(argv)
}

/// `npm` command line.
pub fn npm_command(step: &Step) -> Result<Vec<String>, StepCommandError> {
    let command = step.with_input("command").unwrap_or("install");
    let mut argv = vec!["npm".to_string()];
    let is_run_like = matches!(command, "run" | "build" | "start");

    match command {
        "install" | "ci" | "test" | "publish" => argv.push(command.to_string()),
        "build" => {
            argv.push("run".to_string());
            argv.push("build".to_string());
        }
        "start" => argv.push("start".to_string()),
        "run" => {
            let script = step
                .with_input("script")
                .filter(|s| !s.is_empty())
                .ok_or(StepCommandError::MissingNpmScript)?;
            argv.push("run".to_string());
            argv.push(script.to_string());
        }
        other => return Err(StepCommandError::UnsupportedNpmCommand(other.to_string())),
    }

    if let Some(arguments) = step.with_input("arguments").filter(|a| !a.is_empty()) {
        if is_run_like {
            argv.push("--".to_string());
        }
        argv.extend(arguments.split_whitespace().map(str::to_string));
    }

    Ok(argv)
}

/// `docker` command line for the `docker` step kind (not to be confused
/// with the container manager's own use of the Docker API).
pub fn docker_command(step: &Step) -> Result<Vec<String>, StepCommandError> {
    let command = step
        .with_input("command")
        .ok_or(StepCommandError::MissingInput("command"))?;
    let mut argv = vec!["docker".to_string()];

    match command {
        "build" => {
            argv.push("build".to_string());
            if let Some(dockerfile) = step.with_input("Dockerfile").filter(|d| !d.is_empty()) {
                argv.push("-f".to_string());
                argv.push(dockerfile.to_string());
            }
            for tag in csv(step.with_input("tags")) {
                argv.push("-t".to_string());
                argv.push(tag);
            }
            for build_arg in csv(step.with_input("buildArgs")) {
                argv.push("--build-arg".to_string());
                argv.push(build_arg);
            }
            if let Some(target) = step.with_input("target").filter(|t| !t.is_empty()) {
                argv.push("--target".to_string());
                argv.push(target.to_string());
            }
            let context = step.with_input("context").filter(|c| !c.is_empty()).unwrap_or(".");
            argv.push(context.to_string());
        }
        "tag" => {
            let source = step
                .with_input("sourceImage")
                .ok_or(StepCommandError::MissingInput("sourceImage"))?;
            let target = step
                .with_input("targetTag")
                .ok_or(StepCommandError::MissingInput("targetTag"))?;
            argv.push("tag".to_string());
            argv.push(source.to_string());
            argv.push(target.to_string());
        }
        "run" => {
            let image = step.with_input("image").ok_or(StepCommandError::MissingInput("image"))?;
            argv.push("run".to_string());
            if let Some(arguments) = step.with_input("arguments").filter(|a| !a.is_empty()) {
                argv.extend(arguments.split_whitespace().map(str::to_string));
            }
            argv.push(image.to_string());
        }
        "push" => {
            let image = step.with_input("image").ok_or(StepCommandError::MissingInput("image"))?;
            argv.push("push".to_string());
            argv.push(image.to_string());
        }
        other => return Err(StepCommandError::UnsupportedDockerCommand(other.to_string())),
    }

    Ok(argv)
}

fn csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn step_with(with: &[(&str, &str)]) -> Step {
        let mut map = HashMap::new();
        for (k, v) in with {
            map.insert(k.to_string(), v.to_string());
        }
        Step {
            id: "s1".into(),
            name: "step".into(),
            kind: pdk_core::pipeline::StepKind::Script,
            script: None,
            shell: None,
            with: map,
            env: HashMap::new(),
            working_directory: None,
            continue_on_error: false,
            needs: vec![],
            artifact: None,
        }
    }

    #[test]
    fn checkout_clones_when_repo_given_and_workspace_is_empty() {
        let step = step_with(&[("repository", "https://example.com/r.git"), ("ref", "main")]);
        let commands = checkout_commands(&step, false);
        assert_eq!(
            commands,
            vec![
                vec!["git".to_string(), "clone".to_string(), "https://example.com/r.git".to_string(), ".".to_string()],
                vec!["git".to_string(), "checkout".to_string(), "main".to_string()],
            ]
        );
    }

    #[test]
    fn checkout_pulls_when_repo_already_present() {
        let step = step_with(&[("repository", "https://example.com/r.git")]);
        let commands = checkout_commands(&step, true);
        assert_eq!(commands, vec![vec!["git".to_string(), "pull".to_string()]]);
    }

    #[test]
    fn checkout_with_self_repository_and_no_ref_runs_nothing() {
        let step = step_with(&[("repository", "self")]);
        assert!(checkout_commands(&step, false).is_empty());
    }

    #[test]
    fn dotnet_build_includes_configuration_but_not_output() {
        let step = step_with(&[("command", "build"), ("configuration", "Release")]);
        let argv = dotnet_command(&step, &["src/App.csproj".to_string()]).unwrap();
        assert_eq!(
            argv,
            vec!["dotnet", "build", "src/App.csproj", "--configuration", "Release"]
        );
    }

    #[test]
    fn dotnet_publish_includes_output_path() {
        let step = step_with(&[("command", "publish"), ("outputPath", "out")]);
        let argv = dotnet_command(&step, &[]).unwrap();
        assert_eq!(argv, vec!["dotnet", "publish", "--output", "out"]);
    }

    #[test]
    fn dotnet_rejects_unknown_command() {
        let step = step_with(&[("command", "bogus")]);
        assert_eq!(
            dotnet_command(&step, &[]),
            Err(StepCommandError::UnsupportedDotNetCommand("bogus".to_string()))
        );
    }

    #[test]
    fn npm_build_becomes_run_build() {
        let step = step_with(&[("command", "build")]);
        assert_eq!(npm_command(&step).unwrap(), vec!["npm", "run", "build"]);
    }

    #[test]
    fn npm_run_requires_script() {
        let step = step_with(&[("command", "run")]);
        assert_eq!(npm_command(&step), Err(StepCommandError::MissingNpmScript));
    }

    #[test]
    fn npm_run_appends_arguments_after_double_dash() {
        let step = step_with(&[("command", "run"), ("script", "lint"), ("arguments", "--fix")]);
        assert_eq!(npm_command(&step).unwrap(), vec!["npm", "run", "lint", "--", "--fix"]);
    }

    #[test]
    fn npm_ci_appends_arguments_without_double_dash() {
        let step = step_with(&[("command", "ci"), ("arguments", "--prefer-offline")]);
        assert_eq!(npm_command(&step).unwrap(), vec!["npm", "ci", "--prefer-offline"]);
    }

    #[test]
    fn docker_build_collects_tags_and_build_args() {
        let step = step_with(&[
            ("command", "build"),
            ("tags", "app:latest, app:1.0"),
            ("buildArgs", "FOO=bar"),
        ]);
        let argv = docker_command(&step).unwrap();
        assert_eq!(
            argv,
            vec!["docker", "build", "-t", "app:latest", "-t", "app:1.0", "--build-arg", "FOO=bar", "."]
        );
    }

    #[test]
    fn docker_tag_requires_source_and_target() {
        let step = step_with(&[("command", "tag"), ("sourceImage", "a:1")]);
        assert_eq!(
            docker_command(&step),
            Err(StepCommandError::MissingInput("targetTag"))
        );
    }
}
