//! Media encode/mux operations used by the assembly stage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::get_duration;
use crate::subtitles::escape_filter_path;
use crate::trajectory::Trajectory;

/// One still-image animation.
#[derive(Debug, Clone)]
pub struct AnimateRequest {
    pub image: PathBuf,
    pub output: PathBuf,
    /// Exact number of frames to emit
    pub frames: u64,
    pub fps: u32,
    /// Output frame size (width, height)
    pub size: (u32, u32),
    pub trajectory: Trajectory,
}

impl AnimateRequest {
    /// Clip duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames as f64 / self.fps as f64
    }
}

/// Video encoding collaborator.
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Render a still image into a clip of exactly `request.frames` frames.
    async fn animate(&self, request: &AnimateRequest) -> MediaResult<PathBuf>;

    /// Concatenate video clips in the given order.
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<PathBuf>;

    /// Concatenate audio clips into one track and return its measured duration.
    async fn concat_audio(&self, clips: &[PathBuf], output: &Path) -> MediaResult<f64>;

    /// Combine a video stream and an audio track without trimming either,
    /// burning in the ASS `subtitles` when given.
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        subtitles: Option<&Path>,
        output: &Path,
    ) -> MediaResult<PathBuf>;

    /// Measured duration of a media file in seconds.
    async fn duration(&self, path: &Path) -> MediaResult<f64>;
}

/// [`MediaEncoder`] backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    runner: FfmpegRunner,
    crf: u8,
    preset: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            runner: FfmpegRunner::new(),
            crf: 18,
            preset: "fast".to_string(),
        }
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every FFmpeg invocation by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    pub fn with_quality(mut self, crf: u8, preset: impl Into<String>) -> Self {
        self.crf = crf;
        self.preset = preset.into();
        self
    }

    /// Build the animation command.
    pub fn animate_command(&self, request: &AnimateRequest) -> FfmpegCommand {
        let filter = request
            .trajectory
            .filter(request.frames, request.size, request.fps);

        FfmpegCommand::new(&request.image, &request.output)
            .video_filter(filter)
            .video_codec("libx264")
            .preset(self.preset.clone())
            .crf(self.crf)
            .pixel_format("yuv420p")
            .frame_rate(request.fps)
            .frames(request.frames)
            .output_arg("-an")
    }

    /// Build the video concatenation command over a concat list file.
    pub fn concat_command(list: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(list, output)
            .concat_demuxer()
            .stream_copy()
            .output_args(["-movflags", "+faststart"])
    }

    /// Build the audio concatenation command. The result is PCM so its
    /// measured length carries no encoder padding.
    pub fn concat_audio_command(list: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(list, output)
            .concat_demuxer()
            .output_arg("-vn")
            .audio_codec("pcm_s16le")
            .output_args(["-ar", "44100", "-ac", "2"])
    }

    /// Build the mux command, no trimming. The video is copied unless
    /// subtitles are burned in, which needs a re-encode.
    pub fn mux_command(
        &self,
        video: &Path,
        audio: &Path,
        subtitles: Option<&Path>,
        output: &Path,
    ) -> FfmpegCommand {
        let cmd = FfmpegCommand::new(video, output)
            .add_input(audio)
            .map("0:v:0")
            .map("1:a:0");

        let cmd = match subtitles {
            Some(ass) => cmd
                .video_filter(format!("ass='{}'", escape_filter_path(ass)))
                .video_codec("libx264")
                .preset(self.preset.clone())
                .crf(self.crf)
                .pixel_format("yuv420p"),
            None => cmd.video_codec("copy"),
        };

        cmd.audio_codec("aac")
            .audio_bitrate("192k")
            .output_args(["-movflags", "+faststart"])
    }

    async fn write_concat_list(clips: &[PathBuf], output: &Path) -> MediaResult<PathBuf> {
        if clips.is_empty() {
            return Err(MediaError::invalid_input("nothing to concatenate"));
        }
        for clip in clips {
            if !clip.exists() {
                return Err(MediaError::FileNotFound(clip.clone()));
            }
        }

        let list = output.with_extension("concat.txt");
        tokio::fs::write(&list, concat_list(clips)).await?;
        Ok(list)
    }
}

/// Concat demuxer list with one `file '<path>'` line per clip.
pub fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|clip| {
            let path = clip.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", path)
        })
        .collect()
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn animate(&self, request: &AnimateRequest) -> MediaResult<PathBuf> {
        if request.frames == 0 {
            return Err(MediaError::invalid_input("clip must span at least one frame"));
        }
        if !request.image.exists() {
            return Err(MediaError::FileNotFound(request.image.clone()));
        }

        debug!(
            image = %request.image.display(),
            frames = request.frames,
            effect = request.trajectory.effect.as_str(),
            "Animating still image"
        );
        self.runner.run(&self.animate_command(request)).await?;
        Ok(request.output.clone())
    }

    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<PathBuf> {
        let list = Self::write_concat_list(clips, output).await?;
        let result = self.runner.run(&Self::concat_command(&list, output)).await;
        let _ = tokio::fs::remove_file(&list).await;
        result?;

        info!(clips = clips.len(), output = %output.display(), "Concatenated clips");
        Ok(output.to_path_buf())
    }

    async fn concat_audio(&self, clips: &[PathBuf], output: &Path) -> MediaResult<f64> {
        let list = Self::write_concat_list(clips, output).await?;
        let result = self
            .runner
            .run(&Self::concat_audio_command(&list, output))
            .await;
        let _ = tokio::fs::remove_file(&list).await;
        result?;

        get_duration(output).await
    }

    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        subtitles: Option<&Path>,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        for input in [Some(video), Some(audio), subtitles].into_iter().flatten() {
            if !input.exists() {
                return Err(MediaError::FileNotFound(input.to_path_buf()));
            }
        }
        debug!(subtitles = subtitles.is_some(), "Muxing narration");
        self.runner
            .run(&self.mux_command(video, audio, subtitles, output))
            .await?;
        Ok(output.to_path_buf())
    }

    async fn duration(&self, path: &Path) -> MediaResult<f64> {
        get_duration(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::Effect;

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[
            PathBuf::from("/work/clip_000.mp4"),
            PathBuf::from("/work/it's.mp4"),
        ]);
        assert_eq!(
            list,
            "file '/work/clip_000.mp4'\nfile '/work/it'\\''s.mp4'\n"
        );
    }

    #[test]
    fn test_animate_command_is_frame_exact() {
        let request = AnimateRequest {
            image: PathBuf::from("img.png"),
            output: PathBuf::from("clip.mp4"),
            frames: 143,
            fps: 30,
            size: (1080, 1920),
            trajectory: Trajectory::plan(Effect::ZoomIn, 143),
        };
        let args = FfmpegEncoder::new().animate_command(&request).build_args();
        let pos = args.iter().position(|a| a == "-frames:v").unwrap();
        assert_eq!(args[pos + 1], "143");
        assert!(!args.iter().any(|a| a == "-loop"));
        assert!((request.duration() - 143.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_mux_never_trims() {
        let args = FfmpegEncoder::new()
            .mux_command(
                Path::new("video.mp4"),
                Path::new("narration.wav"),
                None,
                Path::new("final.mp4"),
            )
            .build_args();
        assert!(!args.iter().any(|a| a == "-shortest" || a == "-t"));
        assert!(args.contains(&"1:a:0".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "copy"));
    }

    #[test]
    fn test_mux_burns_in_subtitles() {
        let args = FfmpegEncoder::new()
            .mux_command(
                Path::new("video.mp4"),
                Path::new("narration.wav"),
                Some(Path::new("/work/job:1/subtitles.ass")),
                Path::new("final.mp4"),
            )
            .build_args();
        assert!(args.contains(&"ass='/work/job\\:1/subtitles.ass'".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert!(!args.iter().any(|a| a == "-shortest" || a == "-t"));
    }

    #[tokio::test]
    async fn test_concat_list_is_written_next_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip_000.mp4");
        tokio::fs::write(&clip, b"x").await.unwrap();

        let output = dir.path().join("video.mp4");
        let list = FfmpegEncoder::write_concat_list(&[clip.clone()], &output)
            .await
            .unwrap();
        let contents = tokio::fs::read_to_string(&list).await.unwrap();
        assert!(contents.contains("clip_000.mp4"));
    }

    #[tokio::test]
    async fn test_concat_rejects_missing_clip() {
        let dir = tempfile::tempdir().unwrap();
        let result = FfmpegEncoder::new()
            .concat(&[dir.path().join("missing.mp4")], &dir.path().join("out.mp4"))
            .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
