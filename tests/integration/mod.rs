//! Integration tests replaying the shipped plans against mock source trees.

mod vim_nocursor;
