//! 역할 추론 - 이름/커맨드 키워드 기반

use super::ProcessRole;
use regex::Regex;
use std::sync::OnceLock;

/// 역할별 키워드 (앞에 있을수록 우선)
const ROLE_PATTERNS: &[(ProcessRole, &str)] = &[
    (ProcessRole::E2e, r"(?i)\b(playwright|cypress|e2e)\b"),
    (
        ProcessRole::Test,
        r"(?i)\b(jest|vitest|mocha|pytest|cargo\s+test|go\s+test|test)\b",
    ),
    (
        ProcessRole::Frontend,
        r"(?i)\b(vite|next|react-scripts|webpack|frontend|ng\s+serve|nuxt|svelte)\b",
    ),
    (
        ProcessRole::Backend,
        r"(?i)\b(server|api|backend|express|django|flask|uvicorn|rails|nodemon)\b",
    ),
];

fn patterns() -> &'static [(ProcessRole, Regex)] {
    static PATTERNS: OnceLock<Vec<(ProcessRole, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        ROLE_PATTERNS
            .iter()
            .filter_map(|(role, p)| Regex::new(p).ok().map(|re| (*role, re)))
            .collect()
    })
}

/// 이름/커맨드/인자로 역할 추론
///
/// 우선순위: e2e → test → frontend → backend → utility
pub fn infer_role(name: Option<&str>, command: &str, args: &[String]) -> ProcessRole {
    let haystack = format!("{} {} {}", name.unwrap_or(""), command, args.join(" "));

    patterns()
        .iter()
        .find(|(_, re)| re.is_match(&haystack))
        .map(|(role, _)| *role)
        .unwrap_or(ProcessRole::Utility)
}
