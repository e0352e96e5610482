use std::collections::BTreeSet;
use std::fmt::Write;

pub fn plain_list_names(names: BTreeSet<String>) -> String {
    let mut s = String::new();
    let len = names.len();
    for (idx, n) in names.into_iter().enumerate() {
        if idx != 0 {
            if idx == len - 1 {
                if len == 2 {
                    write!(s, " and ").unwrap();
                } else {
                    write!(s, ", and ").unwrap();
                }
            } else {
                write!(s, ", ").unwrap();
            }
        }
        write!(s, "{}", n).unwrap();
    }
    s
}

pub fn prettyprint_usize(x: usize) -> String {
    let num = format!("{}", x);
    let mut result = String::new();
    let mut i = num.len();
    for c in num.chars() {
        result.push(c);
        i -= 1;
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prettyprint_usize() {
        assert_eq!("0", prettyprint_usize(0));
        assert_eq!("999", prettyprint_usize(999));
        assert_eq!("1,000", prettyprint_usize(1000));
        assert_eq!("12,345,678", prettyprint_usize(12345678));
    }

    #[test]
    fn test_plain_list_names() {
        let names = |list: &[&str]| list.iter().map(|x| x.to_string()).collect::<BTreeSet<_>>();
        assert_eq!("a", plain_list_names(names(&["a"])));
        assert_eq!("a and b", plain_list_names(names(&["b", "a"])));
        assert_eq!("a, b, and c", plain_list_names(names(&["a", "b", "c"])));
    }
}
