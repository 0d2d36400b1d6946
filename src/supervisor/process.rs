//! Bootstrap deployment mechanics for `StartSeed`/`StopSeed`/`StopAll`:
//! placeholder substitution, the heredoc write + `nohup`
//! launch, and the shell fragments used to find and kill the agent's
//! processes. Kept free of the SSH transport so the substitution and
//! command-building logic can be tested without a live session.

use std::path::Path;

/// Values substituted into the bootstrap script before it is deployed.
pub struct BootstrapContext<'a> {
    pub kernel_url: &'a str,
    pub brain_path: &'a str,
    pub seed_port: u16,
    pub app_port: u16,
    /// Merged prompt templates (genesis system prompt plus any
    /// operator-supplied additions), dropped in verbatim.
    pub merged_prompt: &'a str,
}

const PROMPT_PLACEHOLDER: &str = "__MERGED_PROMPT__";

/// Substitutes the four wire placeholders plus the merged prompt
/// template into the raw script text.
pub fn render_bootstrap_script(template: &str, ctx: &BootstrapContext<'_>) -> String {
    template
        .replace("__KERNEL_URL__", ctx.kernel_url)
        .replace("__BRAIN_PATH__", ctx.brain_path)
        .replace("__SEED_PORT__", &ctx.seed_port.to_string())
        .replace("__APP_PORT__", &ctx.app_port.to_string())
        .replace(PROMPT_PLACEHOLDER, ctx.merged_prompt)
}

/// A heredoc delimiter that cannot collide with ordinary script content:
/// the marker embeds a fixed random-looking suffix and
/// is never emitted by `render_bootstrap_script`.
const HEREDOC_MARKER: &str = "KERNEL_BOOTSTRAP_EOF_7f3a9c";

/// Builds the remote shell command that writes `content` to `remote_path`
/// via heredoc, then launches it with `nohup`, backgrounding it and
/// echoing the resulting PID as the command's sole stdout line.
pub fn deploy_and_launch_command(remote_path: &str, content: &str, launch_cmd: &str) -> String {
    format!(
        "mkdir -p \"$(dirname {remote_path})\" && cat > {remote_path} <<'{marker}'\n{content}\n{marker}\nchmod +x {remote_path} && nohup {launch_cmd} >/dev/null 2>&1 & echo $!",
        remote_path = remote_path,
        content = content,
        launch_cmd = launch_cmd,
        marker = HEREDOC_MARKER,
    )
}

/// Kill-by-PID-or-pattern command for `StopSeed`. Idempotent: `kill`
/// against a dead PID and `pkill` against a no-match pattern both exit
/// nonzero, which `run_allow_failure` tolerates.
pub fn stop_seed_command(pid: Option<u32>, script_name: &str) -> String {
    let mut parts = Vec::new();
    if let Some(pid) = pid {
        parts.push(format!("kill {pid} 2>/dev/null"));
    }
    parts.push(format!("pkill -f {script_name} 2>/dev/null"));
    format!("{}; true", parts.join("; "))
}

/// `StopAll`: also reap anything referencing the code directory, not
/// just the bootstrap script itself (the agent's self-built apps).
pub fn stop_all_command(pid: Option<u32>, script_name: &str, code_dir: &str) -> String {
    format!("{}; pkill -f {code_dir} 2>/dev/null; true", stop_seed_command(pid, script_name))
}

/// PID discovery used by `SetHealthResult` on the first ok-with-unknown-PID
/// transition: find the process the agent's own supervisor established.
pub fn pgrep_command(script_name: &str) -> String {
    format!("pgrep -f {script_name} | head -n1")
}

pub fn parse_pid(output: &str) -> Option<u32> {
    output.trim().lines().next()?.trim().parse().ok()
}

pub fn script_file_name(local_path: &Path) -> String {
    local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bootstrap.sh".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_replaces_all_four_tokens_and_prompt() {
        let template = "KERNEL=__KERNEL_URL__ BRAIN=__BRAIN_PATH__ SEED=__SEED_PORT__ APP=__APP_PORT__\n__MERGED_PROMPT__";
        let ctx = BootstrapContext {
            kernel_url: "http://127.0.0.1:7117",
            brain_path: "/opt/agent/brain.db",
            seed_port: 9001,
            app_port: 9002,
            merged_prompt: "you are the agent",
        };
        let rendered = render_bootstrap_script(template, &ctx);
        assert_eq!(
            rendered,
            "KERNEL=http://127.0.0.1:7117 BRAIN=/opt/agent/brain.db SEED=9001 APP=9002\nyou are the agent"
        );
        assert!(!rendered.contains("__"));
    }

    #[test]
    fn deploy_command_embeds_heredoc_and_echoes_pid() {
        let cmd = deploy_and_launch_command("/opt/agent/run.sh", "echo hi", "/opt/agent/run.sh");
        assert!(cmd.contains("KERNEL_BOOTSTRAP_EOF_7f3a9c"));
        assert!(cmd.ends_with("echo $!"));
        assert!(cmd.contains("nohup /opt/agent/run.sh"));
    }

    #[test]
    fn stop_seed_uses_pid_and_pattern() {
        let cmd = stop_seed_command(Some(1234), "run.sh");
        assert!(cmd.contains("kill 1234"));
        assert!(cmd.contains("pkill -f run.sh"));
    }

    #[test]
    fn stop_seed_without_pid_still_pattern_matches() {
        let cmd = stop_seed_command(None, "run.sh");
        assert!(!cmd.contains("kill "));
        assert!(cmd.contains("pkill -f run.sh"));
    }

    #[test]
    fn parse_pid_takes_first_line() {
        assert_eq!(parse_pid("4242\n"), Some(4242));
        assert_eq!(parse_pid(""), None);
        assert_eq!(parse_pid("not a pid"), None);
    }
}
