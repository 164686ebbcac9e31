//! Plain-text board drawing.

use shakmaty::{Board, File, Rank, Square};

/// Draw `board` with rank 8 at the top, white pieces in upper case and `.` for
/// empty squares.
pub fn draw(board: &Board) -> String {
    let mut out = String::with_capacity(8 * 20 + 20);
    for rank in (0..8u32).rev() {
        out.push(char::from(b'1' + rank as u8));
        for file in 0..8u32 {
            let square = Square::from_coords(File::new(file), Rank::new(rank));
            out.push(' ');
            out.push(board.piece_at(square).map_or('.', |piece| piece.char()));
        }
        out.push('\n');
    }
    out.push_str("  a b c d e f g h\n");
    out
}
