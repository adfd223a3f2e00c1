mod page;
mod post_list;

pub use page::PageView;
pub use post_list::PostListView;
