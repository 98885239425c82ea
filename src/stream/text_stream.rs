//! Text stream pipeline
//!
//! Reads a byte stream of generated text, forwards every decoded chunk for
//! display and cuts complete statements out of it for speech.

use futures_util::{Stream, StreamExt};

use crate::stream::decoder::Utf8StreamDecoder;
use crate::stream::segmenter::{SegmentMode, Segmenter};

/// Receives the output of [`text_stream`]
pub trait StreamHandler {
    /// Newly decoded text, in arrival order
    fn on_text(&mut self, text: &str);

    /// A complete statement (sentence group or paragraph)
    fn on_statement(&mut self, statement: &str);

    /// The stream ended normally and every statement was delivered
    fn on_finish(&mut self) {}
}

/// Drive `stream` to completion through `handler`
///
/// A stream error stops reading and is returned as-is; statements emitted
/// before it stand and `on_finish` is not called.
pub async fn text_stream<S, B, E, H>(
    mut stream: S,
    mode: SegmentMode,
    handler: &mut H,
) -> Result<(), E>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    H: StreamHandler + ?Sized,
{
    let mut decoder = Utf8StreamDecoder::new();
    let mut segmenter = Segmenter::new(mode);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let text = decoder.decode(chunk.as_ref());
        if text.is_empty() {
            continue;
        }
        handler.on_text(&text);
        for statement in segmenter.push(&text) {
            handler.on_statement(&statement);
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        handler.on_text(&tail);
        for statement in segmenter.push(&tail) {
            handler.on_statement(&statement);
        }
    }
    if let Some(rest) = segmenter.finish() {
        handler.on_statement(&rest);
    }
    handler.on_finish();
    Ok(())
}

/// Collect a whole byte stream into a string
pub async fn stream_to_text<S, B, E>(mut stream: S) -> Result<String, E>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut decoder = Utf8StreamDecoder::new();
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&decoder.decode(chunk?.as_ref()));
    }
    text.push_str(&decoder.finish());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[derive(Default)]
    struct Recorder {
        text: String,
        statements: Vec<String>,
        finished: bool,
    }

    impl StreamHandler for Recorder {
        fn on_text(&mut self, text: &str) {
            self.text.push_str(text);
        }

        fn on_statement(&mut self, statement: &str) {
            self.statements.push(statement.to_string());
        }

        fn on_finish(&mut self) {
            self.finished = true;
        }
    }

    fn chunks(parts: &[&[u8]]) -> Vec<Result<Vec<u8>, String>> {
        parts.iter().map(|p| Ok(p.to_vec())).collect()
    }

    #[tokio::test]
    async fn test_paragraph_stream() {
        let body = "Intro line.\n\nSecond paragraph.\n\nTail";
        let bytes = body.as_bytes();
        let input = chunks(&[&bytes[..5], &bytes[5..14], &bytes[14..]]);
        let mut recorder = Recorder::default();

        text_stream(stream::iter(input), SegmentMode::Paragraph, &mut recorder)
            .await
            .unwrap();

        assert_eq!(recorder.text, body);
        assert_eq!(
            recorder.statements,
            vec!["Intro line.", "Second paragraph.", "Tail"]
        );
        assert!(recorder.finished);
    }

    #[tokio::test]
    async fn test_multibyte_split_across_chunks() {
        let body = "你好。世界";
        let bytes = body.as_bytes();
        let input = chunks(&[&bytes[..2], &bytes[2..7], &bytes[7..]]);
        let mut recorder = Recorder::default();
        let mode = SegmentMode::Sentence {
            locale: "zh-CN".to_string(),
            min_length: 1,
        };

        text_stream(stream::iter(input), mode, &mut recorder)
            .await
            .unwrap();

        assert_eq!(recorder.text, body);
        assert_eq!(recorder.statements, vec!["你好。", "世界"]);
    }

    #[tokio::test]
    async fn test_error_stops_without_finish() {
        let input: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"Para one.\n\nPara".to_vec()),
            Err("connection reset".to_string()),
            Ok(b" never read".to_vec()),
        ];
        let mut recorder = Recorder::default();

        let err = text_stream(stream::iter(input), SegmentMode::Paragraph, &mut recorder)
            .await
            .unwrap_err();

        assert_eq!(err, "connection reset");
        assert_eq!(recorder.statements, vec!["Para one."]);
        assert!(!recorder.finished);
    }

    #[tokio::test]
    async fn test_stream_to_text() {
        let input = chunks(&[b"Hel", b"lo"]);
        let text = stream_to_text(stream::iter(input)).await.unwrap();
        assert_eq!(text, "Hello");
    }
}
