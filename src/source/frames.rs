use super::adapter::SourceAdapter;
use crate::error::CaptureError;
use crate::frame::BufferedFrame;
use futures::Stream;

/// Pull frames from an open adapter as a stream.
///
/// After each delivered frame the next `skip_frames` frames are read and
/// discarded, which thins the feed to a lower rate. The stream ends after
/// `max_frames` frames, on the first miss, or after yielding a read fault.
/// A closed adapter yields a single `NotOpen` error.
pub fn frames<'a, A>(
    adapter: &'a mut A,
    max_frames: Option<usize>,
    skip_frames: usize,
) -> impl Stream<Item = Result<BufferedFrame, CaptureError>> + Send + 'a
where
    A: SourceAdapter + ?Sized,
{
    async_stream::stream! {
        if !adapter.is_open() {
            yield Err(CaptureError::NotOpen {
                source_id: adapter.source_id().to_string(),
            });
        } else {
            let mut delivered = 0usize;
            let mut skipped = 0usize;

            while max_frames.map_or(true, |max| delivered < max) {
                match adapter.read().await {
                    Ok(Some(frame)) => {
                        if skipped < skip_frames {
                            skipped += 1;
                            continue;
                        }
                        skipped = 0;
                        delivered += 1;
                        yield Ok(frame);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }
}
