//! ffmpeg subtitle-burn command construction
//!
//! Builds the ffmpeg invocation for one job. The argument list is a pure
//! function of the job, so the same job always produces the same command.

use crate::config::{EncodingSettings, QualityMode};
use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command;

/// Software H.264 encoder
pub const SOFTWARE_CODEC: &str = "libx264";

/// NVENC H.264 encoder used when GPU acceleration is on
pub const GPU_CODEC: &str = "h264_nvenc";

/// Everything needed to run one encode
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    /// Queue item this encode belongs to
    pub item_id: String,
    pub video_path: PathBuf,
    pub subtitle_path: PathBuf,
    pub output_path: PathBuf,
    /// Settings captured at dispatch
    pub settings: EncodingSettings,
    /// Source duration, when the probe succeeded
    pub duration_secs: Option<f64>,
}

/// Turns a job into a process to spawn.
///
/// The process must write progress to stdout (see [`crate::progress`]) and
/// exit 0 on success.
pub trait CommandFactory: Send + Sync {
    fn build(&self, job: &EncodeJob) -> Command;
}

/// [`CommandFactory`] for the ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegCommandFactory {
    ffmpeg_path: String,
}

impl FfmpegCommandFactory {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl CommandFactory for FfmpegCommandFactory {
    fn build(&self, job: &EncodeJob) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(build_ffmpeg_args(job));
        cmd
    }
}

/// Build the ffmpeg argument list
///
/// `-hide_banner -nostdin -y -i <video> -vf subtitles=<sub> -c:v <codec>
/// <quality> -c:a copy -progress pipe:1 -nostats <output>`
///
/// `-y` is always passed: by the time a job runs, admission has either found
/// the output free or the caller accepted overwriting it.
pub fn build_ffmpeg_args(job: &EncodeJob) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-y".into(),
        "-i".into(),
        job.video_path.clone().into_os_string(),
    ];

    args.push("-vf".into());
    args.push(subtitle_filter(&job.subtitle_path).into());

    let codec = codec_for(&job.settings);
    args.push("-c:v".into());
    args.push(codec.into());
    for arg in quality_args(&job.settings) {
        args.push(arg.into());
    }

    // Audio passes through untouched
    args.push("-c:a".into());
    args.push("copy".into());

    args.push("-progress".into());
    args.push("pipe:1".into());
    args.push("-nostats".into());

    args.push(job.output_path.clone().into_os_string());
    args
}

pub fn codec_for(settings: &EncodingSettings) -> &'static str {
    if settings.gpu_acceleration {
        GPU_CODEC
    } else {
        SOFTWARE_CODEC
    }
}

/// Rate-control flags for the chosen quality mode
pub fn quality_args(settings: &EncodingSettings) -> Vec<String> {
    match settings.quality_mode {
        QualityMode::Bitrate => vec!["-b:v".to_string(), format!("{}k", settings.bitrate_kbps)],
        QualityMode::ConstantQuality if settings.gpu_acceleration => {
            vec!["-cq".to_string(), settings.cq.to_string()]
        }
        QualityMode::ConstantQuality => vec!["-crf".to_string(), settings.cq.to_string()],
    }
}

/// `subtitles=<path>` with the path escaped for the filtergraph parser
pub fn subtitle_filter(subtitle_path: &std::path::Path) -> String {
    format!(
        "subtitles={}",
        escape_filter_path(&subtitle_path.to_string_lossy())
    )
}

/// Escape a path for use as a filter option value inside `-vf`.
///
/// Backslashes become forward slashes (ffmpeg accepts them on Windows too).
/// The value is then escaped twice: once for the filter's option parser,
/// which splits on `:`, and once for the filtergraph parser, which strips a
/// level of backslashes before the filter sees its arguments.
pub fn escape_filter_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let option_value = backslash_escape(&normalized, &['\\', ':', '\'']);
    backslash_escape(&option_value, &['\\', '\'', '[', ']', ',', ';'])
}

fn backslash_escape(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        if special.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn job(settings: EncodingSettings) -> EncodeJob {
        EncodeJob {
            item_id: "item-1".to_string(),
            video_path: PathBuf::from("/media/show/ep01.mkv"),
            subtitle_path: PathBuf::from("/media/show/ep01.srt"),
            output_path: PathBuf::from("/out/ep01_subtitled.mp4"),
            settings,
            duration_secs: Some(1420.0),
        }
    }

    #[test]
    fn test_bitrate_software_command() {
        let settings = EncodingSettings {
            quality_mode: QualityMode::Bitrate,
            bitrate_kbps: 2500,
            cq: 23,
            gpu_acceleration: false,
        };
        let cmd = FfmpegCommandFactory::new("/usr/bin/ffmpeg").build(&job(settings));
        let args = get_command_args(&cmd);

        assert_eq!(cmd.as_std().get_program(), "/usr/bin/ffmpeg");
        assert!(has_flag_with_value(&args, "-i", "/media/show/ep01.mkv"));
        assert!(has_flag_with_value(&args, "-vf", "subtitles=/media/show/ep01.srt"));
        assert!(has_flag_with_value(&args, "-c:v", "libx264"));
        assert!(has_flag_with_value(&args, "-b:v", "2500k"));
        assert!(has_flag_with_value(&args, "-c:a", "copy"));
        assert!(has_flag_with_value(&args, "-progress", "pipe:1"));
        assert_eq!(args.last().unwrap(), "/out/ep01_subtitled.mp4");
        assert!(!args.contains(&"-crf".to_string()));
    }

    #[test]
    fn test_constant_quality_software_uses_crf() {
        let settings = EncodingSettings {
            quality_mode: QualityMode::ConstantQuality,
            cq: 20,
            ..EncodingSettings::default()
        };
        let args = get_command_args(&FfmpegCommandFactory::new("ffmpeg").build(&job(settings)));
        assert!(has_flag_with_value(&args, "-crf", "20"));
        assert!(!args.contains(&"-b:v".to_string()));
    }

    #[test]
    fn test_constant_quality_gpu_uses_cq() {
        let settings = EncodingSettings {
            quality_mode: QualityMode::ConstantQuality,
            cq: 28,
            gpu_acceleration: true,
            ..EncodingSettings::default()
        };
        let args = get_command_args(&FfmpegCommandFactory::new("ffmpeg").build(&job(settings)));
        assert!(has_flag_with_value(&args, "-c:v", "h264_nvenc"));
        assert!(has_flag_with_value(&args, "-cq", "28"));
    }

    #[test]
    fn test_escape_filter_path() {
        // `:` and `'` survive both parser levels only when escaped twice
        assert_eq!(
            escape_filter_path(r"C:\subs\ep01.srt"),
            r"C\\:/subs/ep01.srt"
        );
        assert_eq!(
            escape_filter_path("/media/Bob's [2019], part;1.ass"),
            r"/media/Bob\\\'s \[2019\]\, part\;1.ass"
        );
        assert_eq!(escape_filter_path("/media/plain.srt"), "/media/plain.srt");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_args_are_deterministic(
            kbps in 1u32..50_000,
            cq in 0u8..52,
            gpu in proptest::bool::ANY,
            cq_mode in proptest::bool::ANY,
        ) {
            let settings = EncodingSettings {
                quality_mode: if cq_mode { QualityMode::ConstantQuality } else { QualityMode::Bitrate },
                bitrate_kbps: kbps,
                cq,
                gpu_acceleration: gpu,
            };
            let first = build_ffmpeg_args(&job(settings.clone()));
            let second = build_ffmpeg_args(&job(settings));
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.last().unwrap(), &OsString::from("/out/ep01_subtitled.mp4"));
        }
    }
}
