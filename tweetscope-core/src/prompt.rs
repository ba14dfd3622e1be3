// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Personality-analysis prompt template
//!
//! The template wording is fixed; only the profile and post fields are
//! interpolated. Output is a pure function of its inputs.

use std::fmt::Write;

use crate::post::{AuthorProfile, Post};

const PREAMBLE: &str = "你是一个专业的心理咨询师。你的工作是从一个人所发表的推文里专业而详细的分析其性格并分点给出依据，下面是你所需要分析的推主的一些信息：\n\n";

const CLOSING: &str = "\n\n请你根据以上信息，分析这个推主的性格特点，并给出你的分析依据(即所引用的推文原文)。要求写出 500 字以上的分析内容，必须从 10 点以上论述，并在最后从多个维度总结推主是什么样的人。";

/// Render the full prompt for a profile and its posts
pub fn build_prompt(profile: &AuthorProfile, posts: &[Post]) -> String {
    let mut prompt = String::with_capacity(PREAMBLE.len() + CLOSING.len() + posts.len() * 160);
    prompt.push_str(PREAMBLE);
    write_profile(&mut prompt, profile);
    for post in posts {
        write_post(&mut prompt, post);
    }
    prompt.push_str(CLOSING);
    prompt
}

fn write_profile(out: &mut String, profile: &AuthorProfile) {
    // write! into a String cannot fail
    let _ = writeln!(
        out,
        "这个推主的名字是{}；ID 是{}；自我描述是{{{{{}}}}}；拥有{}个粉丝；关注了{}个人；发表了{}条推文；喜欢了{}条推文；注册于{}。",
        profile.name,
        profile.handle,
        profile.description,
        profile.followers_count,
        profile.following_count,
        profile.post_count,
        profile.favorite_count,
        profile.created_at,
    );
}

fn write_post(out: &mut String, post: &Post) {
    let _ = writeln!(out, "这条推文的作者是{}@{}。", post.author_name, post.author_handle);
    let _ = writeln!(out, "这条推文的内容是：{{{{{}}}}}", post.text);
    if !post.mentions.is_empty() {
        out.push_str("这条推文中提到了：");
        for handle in &post.mentions {
            let _ = write!(out, "@{} ", handle);
        }
        out.push('\n');
    }
    let _ = writeln!(out, "这条推文的发布时间是{}。", post.created_at_display());
}
