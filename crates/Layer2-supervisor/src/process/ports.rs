//! 포트 추론 (휴리스틱)
//!
//! 커널에 bind 상태를 묻지 않는다. 커맨드라인, 프레임워크 기본값, 로그 라인에서
//! 찾은 포트를 하나의 집합으로 합친다.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// 로그에서 인정하는 포트 범위
const LOG_PORT_RANGE: std::ops::RangeInclusive<u16> = 1024..=65535;

/// 명시 포트가 없을 때 쓰는 프레임워크 기본 포트
const FRAMEWORK_DEFAULTS: &[(&str, u16)] = &[
    (r"\bvite\b", 5173),
    (r"\bnext\b", 3000),
    (r"\breact-scripts\b", 3000),
    (r"\bng\s+serve\b", 4200),
    (r"\brails\b", 3000),
    (r"\bdjango\b|manage\.py\s+runserver", 8000),
    (r"\bflask\b", 5000),
];

const COMMAND_PATTERNS: &[&str] = &[
    r"--port[=\s]+(\d{1,5})\b",
    r"(?:^|\s)-p\s+(\d{1,5})\b",
    r"\bPORT=(\d{1,5})\b",
];

const LOG_PATTERNS: &[&str] = &[
    r"--port[=\s]+(\d{2,5})\b",
    r"(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1?\]|[A-Za-z0-9][A-Za-z0-9.-]*):(\d{4,5})\b",
    r"(?i)\bport\s*:?\s+(\d{2,5})\b",
];

struct PortPatterns {
    command: Vec<Regex>,
    log: Vec<Regex>,
    frameworks: Vec<(Regex, u16)>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn patterns() -> &'static PortPatterns {
    static PATTERNS: OnceLock<PortPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| PortPatterns {
        command: compile(COMMAND_PATTERNS),
        log: compile(LOG_PATTERNS),
        frameworks: FRAMEWORK_DEFAULTS
            .iter()
            .filter_map(|(p, port)| Regex::new(&format!("(?i){}", p)).ok().map(|re| (re, *port)))
            .collect(),
    })
}

fn captures(regexes: &[Regex], text: &str) -> BTreeSet<u16> {
    regexes
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<u16>().ok()))
        .filter(|port| *port > 0)
        .collect()
}

/// 커맨드라인에서 포트 추론
///
/// 명시 포트(`--port N`, `--port=N`, `-p N`, `PORT=N`)가 있으면 그것만,
/// 없으면 프레임워크 기본 포트를 사용한다.
pub fn ports_from_command(command: &str, args: &[String], env_port: Option<&str>) -> BTreeSet<u16> {
    let line = format!("{} {}", command, args.join(" "));
    let p = patterns();

    let mut ports = captures(&p.command, &line);
    if let Some(port) = env_port.and_then(|v| v.trim().parse::<u16>().ok()) {
        ports.insert(port);
    }

    if ports.is_empty() {
        if let Some((_, port)) = p.frameworks.iter().find(|(re, _)| re.is_match(&line)) {
            ports.insert(*port);
        }
    }

    ports
}

/// 로그 라인에서 포트 추론 (1024-65535 만)
pub fn ports_from_log_line(line: &str) -> BTreeSet<u16> {
    captures(&patterns().log, line)
        .into_iter()
        .filter(|port| LOG_PORT_RANGE.contains(port))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn set(ports: &[u16]) -> BTreeSet<u16> {
        ports.iter().copied().collect()
    }

    #[test]
    fn test_explicit_command_ports() {
        assert_eq!(ports_from_command("vite", &args(&["--port", "4000"]), None), set(&[4000]));
        assert_eq!(ports_from_command("serve", &args(&["--port=8081"]), None), set(&[8081]));
        assert_eq!(ports_from_command("http-server", &args(&["-p", "9000"]), None), set(&[9000]));
        assert_eq!(ports_from_command("PORT=3001", &args(&["node", "app.js"]), None), set(&[3001]));
    }

    #[test]
    fn test_framework_defaults() {
        assert_eq!(ports_from_command("npx", &args(&["vite"]), None), set(&[5173]));
        assert_eq!(ports_from_command("npx", &args(&["next", "dev"]), None), set(&[3000]));
        assert_eq!(ports_from_command("ng", &args(&["serve"]), None), set(&[4200]));
        assert_eq!(
            ports_from_command("python", &args(&["manage.py", "runserver"]), None),
            set(&[8000])
        );
        assert!(ports_from_command("node", &args(&["worker.js"]), None).is_empty());
    }

    #[test]
    fn test_env_port() {
        assert_eq!(ports_from_command("node", &args(&["app.js"]), Some("7070")), set(&[7070]));
    }

    #[test]
    fn test_log_ports() {
        assert_eq!(ports_from_log_line("  Local:   http://localhost:5173/"), set(&[5173]));
        assert_eq!(ports_from_log_line("Server listening on port 8080"), set(&[8080]));
        assert_eq!(ports_from_log_line("bound to 0.0.0.0:3000"), set(&[3000]));
        assert!(ports_from_log_line("compiled at 12:30:45").is_empty());
        // 1024 미만은 무시
        assert!(ports_from_log_line("listening on port 80").is_empty());
    }
}
