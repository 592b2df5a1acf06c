use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Create a progress bar tracking bytes of one transfer.
///
/// Renders to stderr (not stdout) so piped output stays clean. Returns a
/// hidden bar if quiet mode is active. Without a known total the bar is a
/// spinner showing bytes and rate.
pub fn create_transfer_progress(total_bytes: Option<u64>, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let (pb, template) = match total_bytes {
        Some(total) => (
            ProgressBar::new(total),
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
             {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})",
        ),
        None => (
            ProgressBar::no_length(),
            "{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec})",
        ),
    };
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}
