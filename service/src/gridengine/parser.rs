use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::OnceLock;

use domain::model::entity::{Attributes, JobId};
use domain::service::{AccountingOutcome, CancelAck};
use domain::{Result, SchedulerError};
use regex::Regex;

use super::RUNNING_STATE;

const JOB_NUMBER: &str = "JB_job_number";
const STATE: &str = "state";
const QACCT_JOB_NUMBER: &str = "jobnumber";
const QACCT_EXIT_STATUS: &str = "exit_status";
const QACCT_FAILED: &str = "failed";
/// Grid Engine reports `100 : assumedly after job` for jobs killed by a signal
const KILLED_PREFIX: &str = "100";

fn job_list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<job_list\b[^>]*>(.*?)</job_list>").expect("job_list pattern is valid")
    })
}

fn field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<([A-Za-z_][\w.]*)>([^<]*)</([A-Za-z_][\w.]*)>")
            .expect("field pattern is valid")
    })
}

fn submit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^Your job (\d+) \(".*"\) has been submitted$"#)
            .expect("submit pattern is valid")
    })
}

/// Parses `qstat -xml` into the attributes of every listed job.
///
/// In relaxed mode, entries that cannot be understood are logged and skipped.
pub fn parse_qstat_xml(text: &str, relaxed: bool) -> Result<HashMap<JobId, Attributes>> {
    if !text.contains("<job_info") {
        return violation(relaxed, "qstat output has no job_info element").map(|_| HashMap::new());
    }

    let mut jobs = HashMap::<JobId, Attributes>::new();
    for list in job_list_pattern().captures_iter(text) {
        let mut attributes = Attributes::new();
        let mut malformed = false;
        for field in field_pattern().captures_iter(&list[1]) {
            if field[1] != field[3] {
                malformed = true;
                break;
            }
            attributes.insert(field[1].to_owned(), unescape(field[2].trim()));
        }
        if malformed || !attributes.contains_key(STATE) {
            violation(relaxed, "qstat job_list entry without a state")?;
            continue;
        }
        let Some(id) = attributes.get(JOB_NUMBER).cloned() else {
            violation(relaxed, "qstat job_list entry without a job number")?;
            continue;
        };

        // Array jobs list one entry per task; a job counts as running once any task runs.
        match jobs.entry(JobId::from(id)) {
            Entry::Vacant(entry) => {
                entry.insert(attributes);
            }
            Entry::Occupied(mut entry) => {
                if entry.get().get(STATE).map(String::as_str) != Some(RUNNING_STATE) {
                    entry.insert(attributes);
                }
            }
        }
    }
    Ok(jobs)
}

fn violation(relaxed: bool, message: &str) -> Result<()> {
    if relaxed {
        tracing::warn!("Ignoring malformed scheduler output: {message}");
        Ok(())
    } else {
        Err(SchedulerError::Protocol(message.to_owned()))
    }
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Parses the key/value blocks printed by `qacct -j <id>`.
///
/// Returns `Ok(None)` when there is no record at all. If a job number was reused,
/// the last record wins.
pub fn parse_qacct(text: &str, job: &JobId) -> Result<Option<Attributes>> {
    let mut records = Vec::<Attributes>::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("====") {
            records.push(Attributes::new());
            continue;
        }
        let Some(record) = records.last_mut() else {
            return Err(SchedulerError::Protocol(format!(
                "qacct output starts without a record separator: {line:?}"
            )));
        };
        let (key, value) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        record.insert(key.to_owned(), value.trim().to_owned());
    }

    let mut found = None;
    for record in records {
        match record.get(QACCT_JOB_NUMBER) {
            Some(number) if number == job.as_str() => found = Some(record),
            Some(number) => {
                return Err(SchedulerError::Protocol(format!(
                    "qacct returned job {number} when asked for {job}"
                )))
            }
            None => {
                return Err(SchedulerError::Protocol(format!(
                    "qacct record for {job} has no {QACCT_JOB_NUMBER}"
                )))
            }
        }
    }
    Ok(found)
}

pub fn accounting_outcome(record: &Attributes) -> Result<AccountingOutcome> {
    let job = record.get(QACCT_JOB_NUMBER).map(String::as_str).unwrap_or("?");
    let exit_status = record.get(QACCT_EXIT_STATUS).ok_or_else(|| {
        SchedulerError::Protocol(format!("qacct record for {job} has no {QACCT_EXIT_STATUS}"))
    })?;
    let exit_code: i32 = exit_status.parse().map_err(|_| {
        SchedulerError::Protocol(format!(
            "cannot parse exit code of job {job} from {exit_status:?}"
        ))
    })?;
    let failed = record.get(QACCT_FAILED).ok_or_else(|| {
        SchedulerError::Protocol(format!("qacct record for {job} has no {QACCT_FAILED}"))
    })?;

    Ok(if failed == "0" {
        AccountingOutcome::Exited(exit_code)
    } else if failed.starts_with(KILLED_PREFIX) {
        AccountingOutcome::Killed
    } else {
        AccountingOutcome::Failed {
            exit_code,
            reason: failed.clone(),
        }
    })
}

/// Parses `qconf -sql`: one queue name per line.
pub fn parse_queue_names(text: &str) -> Vec<String> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned).collect()
}

/// Parses the cluster queue summary printed by `qstat -g c`.
pub fn parse_queue_summary(text: &str) -> Result<HashMap<String, Attributes>> {
    let table = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('-'))
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .replacen("CLUSTER QUEUE", "CLUSTER_QUEUE", 1);
    if !table.starts_with("CLUSTER_QUEUE") {
        return Err(SchedulerError::Protocol(
            "qstat -g c output has no CLUSTER QUEUE header".to_owned(),
        ));
    }

    let protocol = |e: csv::Error| SchedulerError::Protocol(format!("qstat -g c: {e}"));
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .quoting(false)
        .from_reader(table.as_bytes());
    let headers = reader.headers().map_err(protocol)?.clone();
    let mut queues = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(protocol)?;
        let mut attributes: Attributes = headers
            .iter()
            .zip(record.iter())
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        if let Some(name) = attributes.remove("CLUSTER_QUEUE") {
            queues.insert(name, attributes);
        }
    }
    Ok(queues)
}

/// Finds the acknowledgement line in `qsub` output; warnings may precede it.
pub fn parse_submit_ack(text: &str) -> Result<JobId> {
    text.lines()
        .find_map(|line| submit_pattern().captures(line.trim()))
        .map(|c| JobId::from(&c[1]))
        .ok_or_else(|| SchedulerError::CannotParseSubmission(text.trim().to_owned()))
}

pub fn parse_cancel_ack(text: &str, job: &JobId) -> Result<CancelAck> {
    let ack = text.trim();
    if ack.ends_with(&format!(" has deleted job {job}")) {
        Ok(CancelAck::RemovedWhilePending)
    } else if ack.ends_with(&format!(" has registered the job {job} for deletion")) {
        Ok(CancelAck::SignalledWhileRunning)
    } else {
        Err(SchedulerError::Protocol(format!(
            "unexpected qdel acknowledgement for job {job}: {ack:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const QSTAT: &str = indoc! {r#"
        <?xml version='1.0'?>
        <job_info  xmlns:xsd="http://arc.liv.ac.uk/repos/darcs/sge/source/dist/util/resources/schemas/qstat/qstat.xsd">
          <queue_info>
            <job_list state="running">
              <JB_job_number>42</JB_job_number>
              <JAT_prio>0.55500</JAT_prio>
              <JB_name>simulate &amp; plot</JB_name>
              <JB_owner>alice</JB_owner>
              <state>r</state>
              <JAT_start_time>2024-03-01T10:00:00</JAT_start_time>
              <queue_name>all.q@node1</queue_name>
              <slots>1</slots>
            </job_list>
          </queue_info>
          <job_info>
            <job_list state="pending">
              <JB_job_number>43</JB_job_number>
              <JAT_prio>0.00000</JAT_prio>
              <JB_name>post</JB_name>
              <JB_owner>alice</JB_owner>
              <state>qw</state>
              <JB_submission_time>2024-03-01T10:01:00</JB_submission_time>
              <queue_name></queue_name>
              <slots>1</slots>
            </job_list>
          </job_info>
        </job_info>
    "#};

    const EMPTY_QSTAT: &str = indoc! {r#"
        <?xml version='1.0'?>
        <job_info  xmlns:xsd="http://arc.liv.ac.uk/repos/darcs/sge/source/dist/util/resources/schemas/qstat/qstat.xsd">
          <queue_info>
          </queue_info>
          <job_info>
          </job_info>
        </job_info>
    "#};

    const QACCT: &str = indoc! {"
        ==============================================================
        qname        all.q
        hostname     node1
        group        users
        owner        alice
        jobname      simulate
        jobnumber    42
        exit_status  2
        failed       0
        ru_wallclock 12s
    "};

    #[test]
    fn qstat_jobs() {
        let jobs = parse_qstat_xml(QSTAT, false).unwrap();
        assert_eq!(2, jobs.len());
        let running = &jobs[&JobId::from("42")];
        assert_eq!("r", running["state"]);
        assert_eq!("simulate & plot", running["JB_name"]);
        assert_eq!("all.q@node1", running["queue_name"]);
        let pending = &jobs[&JobId::from("43")];
        assert_eq!("qw", pending["state"]);
        assert_eq!("", pending["queue_name"]);
    }

    #[test]
    fn qstat_empty_is_success() {
        assert!(parse_qstat_xml(EMPTY_QSTAT, false).unwrap().is_empty());
    }

    #[test]
    fn qstat_is_pure() {
        assert_eq!(parse_qstat_xml(QSTAT, false), parse_qstat_xml(QSTAT, false));
    }

    #[test]
    fn qstat_unrecognized() {
        let err = parse_qstat_xml("error: commlib error", false).unwrap_err();
        assert!(matches!(err, SchedulerError::Protocol(_)));
        assert!(parse_qstat_xml("error: commlib error", true).unwrap().is_empty());
    }

    #[test]
    fn qstat_entry_without_number() {
        let text = QSTAT.replace("<JB_job_number>43</JB_job_number>", "");
        assert!(parse_qstat_xml(&text, false).is_err());

        let jobs = parse_qstat_xml(&text, true).unwrap();
        assert_eq!(1, jobs.len());
        assert!(jobs.contains_key(&JobId::from("42")));
    }

    #[test]
    fn qstat_array_tasks_prefer_running() {
        let text = QSTAT.replace(
            "<JB_job_number>43</JB_job_number>",
            "<JB_job_number>42</JB_job_number>",
        );
        let jobs = parse_qstat_xml(&text, false).unwrap();
        assert_eq!(1, jobs.len());
        assert_eq!("r", jobs[&JobId::from("42")]["state"]);
    }

    #[test]
    fn qacct_record() {
        let record = parse_qacct(QACCT, &JobId::from("42")).unwrap().unwrap();
        assert_eq!("2", record["exit_status"]);
        assert_eq!("all.q", record["qname"]);
        assert_eq!(AccountingOutcome::Exited(2), accounting_outcome(&record).unwrap());
    }

    #[test]
    fn qacct_absent_and_malformed() {
        assert_eq!(None, parse_qacct("", &JobId::from("42")).unwrap());
        assert!(parse_qacct("qname all.q\n", &JobId::from("42")).is_err());
        assert!(parse_qacct(QACCT, &JobId::from("43")).is_err());
    }

    #[test]
    fn qacct_last_record_wins() {
        let text = format!("{}{}", QACCT, QACCT.replace("exit_status  2", "exit_status  0"));
        let record = parse_qacct(&text, &JobId::from("42")).unwrap().unwrap();
        assert_eq!("0", record["exit_status"]);
    }

    #[test]
    fn outcomes() {
        let record = |exit: &str, failed: &str| -> Attributes {
            [("jobnumber", "42"), ("exit_status", exit), ("failed", failed)]
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect()
        };
        assert_eq!(
            AccountingOutcome::Killed,
            accounting_outcome(&record("137", "100 : assumedly after job")).unwrap()
        );
        assert_eq!(
            AccountingOutcome::Failed {
                exit_code: 0,
                reason: "37  : qmaster enforced h_rt limit".to_owned()
            },
            accounting_outcome(&record("0", "37  : qmaster enforced h_rt limit")).unwrap()
        );
        assert!(matches!(
            accounting_outcome(&record("two", "0")),
            Err(SchedulerError::Protocol(_))
        ));
    }

    #[test]
    fn queue_names() {
        assert_eq!(vec!["all.q", "long.q"], parse_queue_names("all.q\nlong.q\n\n"));
    }

    #[test]
    fn queue_summary() {
        let out = indoc! {"
            CLUSTER QUEUE                   CQLOAD   USED    RES  AVAIL  TOTAL aoACDS  cdsuE
            --------------------------------------------------------------------------------
            all.q                             0.01      1      0      7      8      0      0
            long.q                            -NA-      0      0      0      4      0      4
        "};
        let queues = parse_queue_summary(out).unwrap();
        assert_eq!(2, queues.len());
        assert_eq!("7", queues["all.q"]["AVAIL"]);
        assert_eq!("4", queues["long.q"]["cdsuE"]);
        assert!(parse_queue_summary("no header here").is_err());
    }

    #[test]
    fn submit_ack() {
        let id = parse_submit_ack("Your job 3407845 (\"simulate\") has been submitted\n").unwrap();
        assert_eq!("3407845", id.as_str());
        assert!(matches!(
            parse_submit_ack("Unable to run job: denied"),
            Err(SchedulerError::CannotParseSubmission(_))
        ));
    }

    #[test]
    fn submit_ack_after_warnings() {
        let stdout = indoc! {r#"
            warning: no suitable queues for job "simulate" at this time
            Your job 3407846 ("simulate") has been submitted
        "#};
        assert_eq!("3407846", parse_submit_ack(stdout).unwrap().as_str());
        assert!(matches!(
            parse_submit_ack("warning: queue long.q disabled\nUnable to run job: denied\n"),
            Err(SchedulerError::CannotParseSubmission(_))
        ));
    }

    #[test]
    fn cancel_ack() {
        let job = JobId::from("42");
        assert_eq!(
            CancelAck::RemovedWhilePending,
            parse_cancel_ack("alice has deleted job 42\n", &job).unwrap()
        );
        assert_eq!(
            CancelAck::SignalledWhileRunning,
            parse_cancel_ack("alice has registered the job 42 for deletion", &job).unwrap()
        );
        assert!(parse_cancel_ack("alice has deleted job 420", &job).is_err());
        assert!(parse_cancel_ack("job 42 is already in deletion", &job).is_err());
    }
}
