pub mod box_annotator;
mod bitmap_font;
