/// Longest filename Linux accepts, in bytes.
const NAME_MAX: usize = 255;

fn is_unsafe(c: char) -> bool {
    c == '/' || c == '\\' || c.is_control() || c.is_whitespace()
}

/// Makes `name` usable as a single Linux path component.
///
/// Separators, whitespace and control characters become a single `_`; leading
/// and trailing dots or underscores are trimmed; the result is cut to
/// `NAME_MAX` bytes on a char boundary.
pub fn sanitize_filename_for_linux(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if is_unsafe(c) {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut take = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_become_underscores() {
        assert_eq!(sanitize_filename_for_linux("a/b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_filename_for_linux("a \t b.txt"), "a_b.txt");
        assert_eq!(sanitize_filename_for_linux("file\0name"), "file_name");
    }

    #[test]
    fn edges_trimmed() {
        assert_eq!(sanitize_filename_for_linux(" ..file.txt.. "), "file.txt");
        assert_eq!(sanitize_filename_for_linux(".."), "");
    }

    #[test]
    fn long_names_cut_on_char_boundary() {
        let name = "é".repeat(200);
        let out = sanitize_filename_for_linux(&name);
        assert!(out.len() <= NAME_MAX);
        assert!(out.chars().all(|c| c == 'é'));
    }
}
