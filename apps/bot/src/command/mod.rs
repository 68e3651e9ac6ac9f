mod drop;
mod settings;
mod track;
mod tracked;
mod update;

use crate::{Data, Error};

pub use drop::drop;
pub use settings::{make_this_my_default_channel, mute, unmute};
pub use track::track;
pub use tracked::tracked;
pub use update::update_me;

pub fn commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        track(),
        drop(),
        mute(),
        unmute(),
        update_me(),
        make_this_my_default_channel(),
        tracked(),
    ]
}
