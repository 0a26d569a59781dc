pub mod structuring; // Transcript + soil reading extraction through Gemini
