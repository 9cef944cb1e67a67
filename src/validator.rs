//! Validator (§4.5): probes a candidate URL and decides whether it's
//! playable as-is, playable after a remux, or must be rejected.

use std::sync::Arc;

use crate::collaborators::media::{AudioAction, ProbeResult, RemuxPlan};
use crate::collaborators::Prober;
use crate::config::ValidatorConfig;
use crate::error::CandidateFailure;
use crate::model::{PlatformHint, SubtitleTrack};

pub struct ValidationDecision {
    pub plan: RemuxPlan,
    pub embedded_subtitle_tracks: Vec<SubtitleTrack>,
    pub recommended_subtitle_index: Option<u32>,
    pub has_english_subtitle: bool,
}

pub struct Validator {
    prober: Arc<dyn Prober>,
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(prober: Arc<dyn Prober>, config: ValidatorConfig) -> Self {
        Validator { prober, config }
    }

    pub async fn validate(&self, url: &str, platform_hint: PlatformHint) -> Result<ValidationDecision, CandidateFailure> {
        let probe = self
            .prober
            .probe(url)
            .await
            .map_err(|_| CandidateFailure::SourceDead)?;

        self.decide(&probe, platform_hint)
    }

    fn decide(&self, probe: &ProbeResult, platform_hint: PlatformHint) -> Result<ValidationDecision, CandidateFailure> {
        let video_known = !probe.video_codec.is_empty();
        let video_accepted = probe.timed_out
            // Probe timeout: accept if codec known at all, to avoid a false reject (§4.5).
            .then_some(video_known)
            .unwrap_or_else(|| self.config.accepted_video_codecs.iter().any(|c| c == &probe.video_codec));
        if !video_accepted {
            return Err(CandidateFailure::IncompatibleVideo);
        }

        let default_audio = probe
            .audio_streams
            .iter()
            .find(|s| s.is_default)
            .or_else(|| probe.audio_streams.first());

        let audio_action = match default_audio {
            None => AudioAction::TranscodeTo {
                target_codec: self.config.audio_transcode_target.clone(),
            },
            Some(default_stream) => {
                let default_compatible =
                    probe.timed_out || self.config.accepted_audio_codecs.iter().any(|c| c == &default_stream.codec);
                if default_compatible {
                    AudioAction::None
                } else {
                    match self.best_alternate_audio(probe, default_stream.language.as_str()) {
                        Some(alt) => AudioAction::RemuxToStream { source_index: alt.index },
                        None => AudioAction::TranscodeTo {
                            target_codec: self.config.audio_transcode_target.clone(),
                        },
                    }
                }
            }
        };

        let subtitle_tracks = self.build_subtitle_tracks(probe);
        let clean_subtitles = subtitle_tracks.iter().any(|t| !t.keep);
        let recommended_subtitle_index = subtitle_tracks
            .iter()
            .find(|t| t.keep && t.language == "en" && !t.forced)
            .or_else(|| subtitle_tracks.iter().find(|t| t.keep && t.language == "en"))
            .map(|t| t.index);
        let has_english_subtitle = subtitle_tracks.iter().any(|t| t.keep && t.language == "en" && !t.forced);

        let container_is_web_incompatible = platform_hint == PlatformHint::Web && probe.container_is_matroska_like;
        let plan = RemuxPlan {
            stream_copy_to_mp4: container_is_web_incompatible,
            tag_hvc1: container_is_web_incompatible && probe.video_codec == "hevc",
            audio_action,
            clean_subtitles,
            kept_subtitle_tracks: subtitle_tracks.iter().filter(|t| t.keep).cloned().collect(),
        };

        Ok(ValidationDecision {
            plan,
            embedded_subtitle_tracks: subtitle_tracks,
            recommended_subtitle_index,
            has_english_subtitle,
        })
    }

    /// Best compatible alternate audio stream, preferring same language,
    /// then channel count, then codec preference order (§4.5).
    fn best_alternate_audio<'a>(
        &self,
        probe: &'a ProbeResult,
        default_language: &str,
    ) -> Option<&'a crate::collaborators::media::AudioStreamInfo> {
        probe
            .audio_streams
            .iter()
            .filter(|s| self.config.accepted_audio_codecs.iter().any(|c| c == &s.codec))
            .max_by_key(|s| {
                let same_language = s.language == default_language;
                let codec_rank = self
                    .config
                    .accepted_audio_codecs
                    .iter()
                    .position(|c| c == &s.codec)
                    .unwrap_or(usize::MAX);
                // Reverse codec_rank so an earlier (more preferred) codec sorts higher.
                (same_language, s.channels, usize::MAX - codec_rank)
            })
    }

    fn build_subtitle_tracks(&self, probe: &ProbeResult) -> Vec<SubtitleTrack> {
        probe
            .subtitle_streams
            .iter()
            .map(|s| {
                let recognized = is_recognized_language(&s.language);
                let forced_not_default = s.forced && !s.default;
                SubtitleTrack {
                    index: s.index,
                    language: s.language.clone(),
                    forced: s.forced,
                    default: s.default,
                    sdh: s.sdh,
                    keep: recognized && !forced_not_default,
                }
            })
            .collect()
    }
}

fn is_recognized_language(language: &str) -> bool {
    language.len() == 2 && language.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::media::{AudioStreamInfo, SubtitleStreamInfo};

    fn cfg() -> ValidatorConfig {
        ValidatorConfig {
            accepted_video_codecs: vec!["h264".into(), "hevc".into()],
            accepted_audio_codecs: vec!["aac".into(), "ac3".into()],
            audio_transcode_target: "aac".into(),
        }
    }

    fn probe(video_codec: &str) -> ProbeResult {
        ProbeResult {
            video_codec: video_codec.to_string(),
            audio_streams: vec![AudioStreamInfo {
                index: 0,
                codec: "aac".to_string(),
                language: "en".to_string(),
                channels: 2,
                is_default: true,
            }],
            subtitle_streams: vec![],
            has_chapters: false,
            duration_secs: 100.0,
            probe_time_ms: 20,
            timed_out: false,
            container_is_matroska_like: false,
        }
    }

    fn validator() -> Validator {
        Validator::new(Arc::new(crate::collaborators::FakeProber { result: probe("h264") }), cfg())
    }

    #[test]
    fn rejects_unaccepted_video_codec() {
        let v = validator();
        let err = v.decide(&probe("vc1"), PlatformHint::Native).unwrap_err();
        assert_eq!(err, CandidateFailure::IncompatibleVideo);
    }

    #[test]
    fn accepts_known_codec_even_if_probe_timed_out() {
        let v = validator();
        let mut p = probe("h264");
        p.timed_out = true;
        assert!(v.decide(&p, PlatformHint::Native).is_ok());
    }

    #[test]
    fn falls_back_to_audio_transcode_when_no_compatible_stream_exists() {
        let v = validator();
        let mut p = probe("h264");
        p.audio_streams = vec![AudioStreamInfo {
            index: 0,
            codec: "dts".to_string(),
            language: "en".to_string(),
            channels: 6,
            is_default: true,
        }];
        let decision = v.decide(&p, PlatformHint::Native).unwrap();
        assert!(matches!(decision.plan.audio_action, AudioAction::TranscodeTo { .. }));
    }

    #[test]
    fn picks_same_language_alternate_audio_over_other_language() {
        let v = validator();
        let mut p = probe("h264");
        p.audio_streams = vec![
            AudioStreamInfo {
                index: 0,
                codec: "dts".to_string(),
                language: "en".to_string(),
                channels: 2,
                is_default: true,
            },
            AudioStreamInfo {
                index: 1,
                codec: "aac".to_string(),
                language: "fr".to_string(),
                channels: 2,
                is_default: false,
            },
            AudioStreamInfo {
                index: 2,
                codec: "ac3".to_string(),
                language: "en".to_string(),
                channels: 6,
                is_default: false,
            },
        ];
        let decision = v.decide(&p, PlatformHint::Native).unwrap();
        match decision.plan.audio_action {
            AudioAction::RemuxToStream { source_index } => assert_eq!(source_index, 2),
            other => panic!("expected remux to stream 2, got {other:?}"),
        }
    }

    #[test]
    fn recommends_first_non_forced_english_kept_track() {
        let v = validator();
        let mut p = probe("h264");
        p.subtitle_streams = vec![
            SubtitleStreamInfo {
                index: 0,
                language: "en".to_string(),
                forced: true,
                default: false,
                sdh: false,
            },
            SubtitleStreamInfo {
                index: 1,
                language: "en".to_string(),
                forced: false,
                default: false,
                sdh: false,
            },
        ];
        let decision = v.decide(&p, PlatformHint::Native).unwrap();
        assert_eq!(decision.recommended_subtitle_index, Some(1));
        assert!(decision.has_english_subtitle);
    }

    #[test]
    fn drops_forced_but_not_default_and_unrecognized_language_tracks() {
        let v = validator();
        let mut p = probe("h264");
        p.subtitle_streams = vec![
            SubtitleStreamInfo {
                index: 0,
                language: "en".to_string(),
                forced: true,
                default: false,
                sdh: false,
            },
            SubtitleStreamInfo {
                index: 1,
                language: "xx".to_string(),
                forced: false,
                default: false,
                sdh: false,
            },
        ];
        let decision = v.decide(&p, PlatformHint::Native).unwrap();
        assert!(decision.embedded_subtitle_tracks.iter().all(|t| !t.keep));
        assert!(decision.plan.clean_subtitles);
    }

    #[test]
    fn web_platform_matroska_triggers_stream_copy_and_hvc1_tag_for_hevc() {
        let v = Validator::new(Arc::new(crate::collaborators::FakeProber { result: probe("hevc") }), cfg());
        let mut p = probe("hevc");
        p.container_is_matroska_like = true;
        let decision = v.decide(&p, PlatformHint::Web).unwrap();
        assert!(decision.plan.stream_copy_to_mp4);
        assert!(decision.plan.tag_hvc1);
    }
}
