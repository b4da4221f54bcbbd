use domain::model::vo::JobDescription;
use domain::{Result, SchedulerError};
use indoc::formatdoc;

const DEFAULT_JOB_NAME: &str = "jobgate";

/// Renders a `qsub` script for the description.
///
/// Output is deterministic: environment variables are emitted in key order.
pub fn gen_script(description: &JobDescription, parallel_environment: Option<&str>) -> Result<String> {
    validate(description)?;

    let mut directives = Vec::new();
    directives.push(format!("#$ -N {}", job_name(description)));
    match &description.working_directory {
        Some(dir) => directives.push(format!("#$ -wd {}", directive_value(dir))),
        None => directives.push("#$ -cwd".to_owned()),
    }
    if let Some(queue) = &description.queue_name {
        directives.push(format!("#$ -q {queue}"));
    }
    let slots = description.slots();
    if slots > 1 {
        let pe = parallel_environment.ok_or_else(|| {
            SchedulerError::InvalidJobDescription(format!(
                "job needs {slots} slots but no parallel environment is configured"
            ))
        })?;
        directives.push(format!("#$ -pe {pe} {slots}"));
    }
    if let Some(wall_time) = description.max_wall_time {
        directives.push(format!("#$ -l h_rt={}", format_duration(wall_time)));
    }
    if let Some(stdin) = &description.stdin {
        directives.push(format!("#$ -i {}", directive_value(stdin)));
    }
    directives.push(format!(
        "#$ -o {}",
        description.stdout.as_deref().map(directive_value).unwrap_or_else(|| "/dev/null".to_owned())
    ));
    directives.push(format!(
        "#$ -e {}",
        description.stderr.as_deref().map(directive_value).unwrap_or_else(|| "/dev/null".to_owned())
    ));
    let directives = directives.join("\n");

    let mut env = description.environment.iter().collect::<Vec<_>>();
    env.sort();
    let env_string = env
        .into_iter()
        .map(|(k, v)| format!("export {k}={}", protect(v)))
        .collect::<Vec<_>>()
        .join("\n");

    let script = std::iter::once(description.executable.as_str())
        .chain(description.arguments.iter().map(String::as_str))
        .map(protect)
        .collect::<Vec<_>>()
        .join(" ");

    Ok(formatdoc! {r#"
        #!/bin/sh
        #$ -S /bin/sh
        {directives}
        {env_string}
        {script}
    "#})
}

fn validate(description: &JobDescription) -> Result<()> {
    let invalid = |msg: String| Err(SchedulerError::InvalidJobDescription(msg));
    if description.executable.trim().is_empty() {
        return invalid("executable is empty".to_owned());
    }
    if description.node_count == 0 || description.processes_per_node == 0 {
        return invalid(format!(
            "node count and processes per node must be positive, got {} and {}",
            description.node_count, description.processes_per_node
        ));
    }
    if let Some(key) = description.environment.keys().find(|k| !is_identifier(k)) {
        return invalid(format!("invalid environment variable name {key:?}"));
    }
    if let Some(queue) = &description.queue_name {
        if queue.is_empty() || queue.contains(char::is_whitespace) {
            return invalid(format!("invalid queue name {queue:?}"));
        }
    }
    let paths = [
        &description.working_directory,
        &description.stdin,
        &description.stdout,
        &description.stderr,
    ];
    if let Some(path) = paths.into_iter().flatten().find(|p| !is_directive_safe(p)) {
        return invalid(format!("path {path:?} cannot be passed in a #$ directive"));
    }
    Ok(())
}

fn job_name(description: &JobDescription) -> String {
    let name = description
        .name
        .as_deref()
        .unwrap_or(DEFAULT_JOB_NAME)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
        .collect::<String>();
    // Grid Engine rejects names starting with a digit
    match name.chars().next() {
        None => DEFAULT_JOB_NAME.to_owned(),
        Some(c) if c.is_ascii_digit() => format!("j{name}"),
        Some(_) => name,
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// qsub splits `#$` lines itself and knows no escapes, only double quotes
fn is_directive_safe(path: &str) -> bool {
    !path.is_empty() && !path.contains(['"', '\'', '\\', '\n', '\r'])
}

fn directive_value(path: &str) -> String {
    if path.contains(char::is_whitespace) {
        format!("\"{path}\"")
    } else {
        path.to_owned()
    }
}

/// Quotes a word for `/bin/sh` unless it only holds harmless characters.
pub fn protect(word: &str) -> String {
    if !word.is_empty() && word.chars().all(|c| c.is_ascii_alphanumeric() || "/._-=:+,@%".contains(c)) {
        return word.to_owned();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = seconds % 3600 / 60;
    let seconds = seconds % 60;
    format!("{hours:0>2}:{minutes:0>2}:{seconds:0>2}")
}
