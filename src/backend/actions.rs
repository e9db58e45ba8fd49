/// Action identifiers understood by the outline backend
pub const SELECT_NODE: &str = "select_node";
pub const SET_HEADLINE: &str = "set_headline";
pub const SET_BODY: &str = "set_body";
pub const INSERT_NODE: &str = "insert_node";
pub const INSERT_CHILD: &str = "insert_child";
pub const DELETE_NODE: &str = "delete_node";
pub const CLONE_NODE: &str = "clone_node";
pub const MOVE_UP: &str = "move_up";
pub const MOVE_DOWN: &str = "move_down";
pub const MARK: &str = "mark";
pub const UNMARK: &str = "unmark";
pub const EXPAND_ALL: &str = "expand_all";
pub const CONTRACT_ALL: &str = "contract_all";
pub const GOTO_NEXT: &str = "goto_next";
pub const GOTO_PREV: &str = "goto_prev";
pub const FIND: &str = "find";
pub const UNDO: &str = "undo";
pub const REDO: &str = "redo";
pub const GET_BODY: &str = "get_body";
pub const GET_STATES: &str = "get_states";
pub const CLOSE_DOCUMENT: &str = "close_document";

/// Actions that change the outline and so record an undo step
pub const MUTATING: &[&str] = &[
    SET_HEADLINE,
    SET_BODY,
    INSERT_NODE,
    INSERT_CHILD,
    DELETE_NODE,
    CLONE_NODE,
    MOVE_UP,
    MOVE_DOWN,
    MARK,
    UNMARK,
];

pub fn is_mutating(action: &str) -> bool {
    MUTATING.contains(&action)
}
