use super::Scroll;

fn scroll(list_length: u16, viewport_length: u16) -> Scroll {
    let mut scroll = Scroll::default();
    scroll.set_state(list_length, viewport_length);
    return scroll;
}

#[test]
fn it_starts_at_the_bottom() {
    let scroll = scroll(50, 20);
    assert_eq!(scroll.position, 30);
}

#[test]
fn it_stays_at_the_top_when_everything_fits() {
    let mut scroll = scroll(5, 20);
    scroll.down_page();
    assert_eq!(scroll.position, 0);
}

#[test]
fn it_scrolls_up_and_down_within_bounds() {
    let mut scroll = scroll(50, 20);
    scroll.up();
    assert_eq!(scroll.position, 29);

    scroll.up_page();
    assert_eq!(scroll.position, 19);

    for _ in 0..5 {
        scroll.up_page();
    }
    assert_eq!(scroll.position, 0);

    for _ in 0..10 {
        scroll.down_page();
    }
    assert_eq!(scroll.position, 30);
}

#[test]
fn it_follows_new_lines_until_scrolled_up() {
    let mut scroll = scroll(50, 20);
    scroll.set_state(60, 20);
    assert_eq!(scroll.position, 40);

    scroll.up();
    scroll.set_state(70, 20);
    assert_eq!(scroll.position, 39);

    scroll.last();
    scroll.set_state(80, 20);
    assert_eq!(scroll.position, 60);
}

#[test]
fn it_clamps_when_the_list_shrinks() {
    let mut scroll = scroll(50, 20);
    scroll.up_page();
    scroll.set_state(10, 20);
    assert_eq!(scroll.position, 0);
}
