use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, Stdio};

fn shell() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mysh"));
    cmd.args(["--prompt", "", "--no-history"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn run_script(script: &str) -> String {
    let mut child = shell().spawn().unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(script.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "{output:?}");
    String::from_utf8(output.stdout).unwrap()
}

fn has_ack(stdout: &str, number: u32) -> bool {
    let prefix = format!("[{number}] ");
    stdout.lines().any(|line| {
        line.strip_prefix(&prefix)
            .is_some_and(|pid| pid.parse::<u32>().is_ok())
    })
}

#[test]
fn test_background_builtin_runs_in_its_own_process() {
    let stdout = run_script("echo hi &\nsleep 0.5\nexit\n");

    assert!(has_ack(&stdout, 1), "{stdout}");
    assert!(stdout.lines().any(|line| line == "hi"), "{stdout}");
    assert!(stdout.contains("[1]+  Done\n"), "{stdout}");
}

#[test]
fn test_done_notices_carry_their_own_job_numbers() {
    let stdout = run_script("sleep 0.8 &\nsleep 0.1 &\nsleep 1.5\nexit\n");

    assert!(has_ack(&stdout, 1), "{stdout}");
    assert!(has_ack(&stdout, 2), "{stdout}");
    let slow = stdout.find("[1]+  Done\n").expect(&stdout);
    let fast = stdout.find("[2]+  Done\n").expect(&stdout);
    assert!(fast < slow, "{stdout}");
}

#[test]
fn test_killed_job_notice_names_its_command() {
    let mut child = shell().stderr(Stdio::null()).spawn().unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    stdin.write_all(b"sleep 5 &\n").unwrap();
    stdin.flush().unwrap();
    let mut ack = String::new();
    stdout.read_line(&mut ack).unwrap();
    let pid = ack.trim_end().strip_prefix("[1] ").expect(&ack);

    writeln!(stdin, "kill {pid} 9\nsleep 0.5\nexit").unwrap();
    drop(stdin);
    let mut rest = String::new();
    stdout.read_to_string(&mut rest).unwrap();
    assert!(child.wait().unwrap().success());

    assert!(rest.contains("[1]+  Done: sleep 5\n"), "{rest}");
}
