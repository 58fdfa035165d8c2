pub use tokenizers::Tokenizer;
use unicode_segmentation::UnicodeSegmentation;

pub type TokenizerError = tokenizers::Error;

/// Token counting seam of the splitter. Production code wraps a Hugging Face
/// tokenizer; tests can use any cheap counter.
pub trait TokenCount
where
	Self: Send + Sync,
{
	fn count(&self, text: &str) -> usize;
}

impl TokenCount for Tokenizer {
	fn count(&self, text: &str) -> usize {
		match self.encode(text, false) {
			Ok(encoding) => encoding.len(),
			Err(err) => {
				tracing::error!(error = %err, "Tokenizer failed to encode text.");

				0
			},
		}
	}
}

#[derive(Clone, Debug)]
pub struct SplitterConfig {
	pub max_tokens: u32,
	pub overlap_tokens: u32,
}

/// One contiguous piece of the source document. Offsets are byte positions
/// into the original text.
#[derive(Clone, Debug)]
pub struct Segment {
	pub index: i32,
	pub start_offset: usize,
	pub end_offset: usize,
	pub text: String,
}

pub fn load_tokenizer(repo: &str) -> Result<Tokenizer, TokenizerError> {
	Tokenizer::from_pretrained(repo, None)
}

/// Splits text into token-bounded segments along sentence boundaries.
///
/// Sentences accumulate until the next one would exceed `max_tokens`; the
/// segment is then sealed and the trailing sentences worth up to
/// `overlap_tokens` are carried into the next segment. A single sentence
/// larger than the budget becomes its own segment rather than being cut
/// mid-sentence.
pub fn split_text(text: &str, cfg: &SplitterConfig, counter: &dyn TokenCount) -> Vec<Segment> {
	let sentences: Vec<(usize, &str)> = text.split_sentence_bound_indices().collect();
	let mut segments = Vec::new();
	// (byte offset, text, token count) of sentences in the open segment.
	let mut open: Vec<(usize, &str, usize)> = Vec::new();
	let mut open_tokens = 0_usize;

	for (offset, sentence) in sentences {
		if sentence.trim().is_empty() {
			continue;
		}

		let tokens = counter.count(sentence);

		if open_tokens + tokens > cfg.max_tokens as usize && !open.is_empty() {
			seal(&mut segments, &open);

			let carried = overlap_tail(&open, cfg.overlap_tokens);

			open.drain(..open.len() - carried);

			open_tokens = open.iter().map(|(_, _, tokens)| *tokens).sum();
		}

		open.push((offset, sentence, tokens));

		open_tokens += tokens;
	}

	if !open.is_empty() {
		seal(&mut segments, &open);
	}

	segments
}

fn seal(segments: &mut Vec<Segment>, open: &[(usize, &str, usize)]) {
	let (start, _, _) = open[0];
	let (last_start, last, _) = open[open.len() - 1];
	let end = last_start + last.len();
	let mut text = String::with_capacity(end - start);

	for (_, sentence, _) in open {
		text.push_str(sentence);
	}

	segments.push(Segment {
		index: segments.len() as i32,
		start_offset: start,
		end_offset: end,
		text,
	});
}

/// Number of trailing sentences whose combined token count fits the overlap
/// budget. Never carries the whole segment.
fn overlap_tail(open: &[(usize, &str, usize)], overlap_tokens: u32) -> usize {
	if overlap_tokens == 0 {
		return 0;
	}

	let mut carried = 0_usize;
	let mut budget = overlap_tokens as usize;

	for (_, _, tokens) in open.iter().rev() {
		if carried + 1 >= open.len() || *tokens > budget {
			break;
		}

		carried += 1;
		budget -= tokens;
	}

	carried
}
