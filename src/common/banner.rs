const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub struct BannerInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub commit: &'static str,
}

impl Default for BannerInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            branch: env_or!("GIT_BRANCH", "unknown"),
            commit: env_or!("GIT_COMMIT", "unknown"),
        }
    }
}

pub fn print_banner(info: &BannerInfo) {
    println!("{GREEN}hlsfetch{RESET} {CYAN}v{}{RESET}", info.version);
    println!(
        "{DIM}branch {} · commit {}{RESET}",
        info.branch,
        &info.commit.get(..7).unwrap_or(info.commit)
    );
}
